//! Explore action paths
//!
//! Unlike the other flows this never reaches the model: the paths are
//! computed locally and returned as-is.

use crate::models::{Action, Path};
use crate::paths::PathEnumerator;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreActionPathsInput {
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreActionPathsOutput {
    pub paths: Vec<Path>,
}

pub fn explore(
    enumerator: &PathEnumerator,
    input: &ExploreActionPathsInput,
) -> Result<ExploreActionPathsOutput> {
    Ok(ExploreActionPathsOutput {
        paths: enumerator.enumerate(&input.actions)?,
    })
}
