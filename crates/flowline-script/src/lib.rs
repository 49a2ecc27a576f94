//! Flowline Script
//!
//! Sandboxed evaluation of user-authored code transforms. A script is a
//! function body with the upstream output bound as `input`; it must `return`
//! the transformed value:
//!
//! ```lua
//! local names = {}
//! for i, user in ipairs(input.users) do
//!   names[i] = string.upper(user.name)
//! end
//! return { names = names, count = #names }
//! ```
//!
//! The [`ScriptEvaluator`] trait is the seam the transform layer calls;
//! [`LuaEvaluator`] is the implementation backed by an isolated Lua 5.4 state
//! per evaluation.

mod convert;
mod error;
mod evaluator;
mod lua;

pub use error::ScriptError;
pub use evaluator::ScriptEvaluator;
pub use lua::{LuaConfig, LuaEvaluator};
