//! Assembly Line - a Git-native pipeline that runs agent stations against
//! commits on a watched branch.
//!
//! This library provides the station pipeline engine: the short-lived process
//! invoked from a Git post-commit hook that decides whether to run, preempts
//! any in-flight predecessor run, and executes each configured station in an
//! isolated worktree.

#[cfg(test)]
pub mod test_utils;

pub mod config;
pub mod git;
pub mod ignore;
pub mod markers;
pub mod pipeline;
pub mod proc;
pub mod state;
pub mod station;
