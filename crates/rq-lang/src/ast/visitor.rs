//! Generic rewriting traversal over the remote expression tree.
//!
//! Every hook has a default that visits the node's children and rebuilds the
//! node only when at least one child comes back as a different node
//! (pointer inequality). A visitor that overrides nothing therefore returns
//! the very same [`ExprRef`] it was given.
//!
//! Implementors override the hooks for the kinds they care about and can
//! call the matching `walk_*` function to fall back to structural traversal.
use crate::{
    Shared,
    rewrite::{define_visitor, is_owned, rewrite_list, rewrite_opt, same, same_opt},
};

use super::node::*;

define_visitor!();
