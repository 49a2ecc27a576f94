//! Flowline Value
//!
//! The universal data unit exchanged between workflow nodes. Every node output,
//! seeded or computed, is a [`Value`], and every transform reads its upstream
//! data through one.
//!
//! Fields inside a value are addressed with dot/bracket paths such as
//! `data.items[0].name`; see [`resolve`].

mod path;
mod value;

pub use path::{Segment, parse_path, resolve, resolve_or_null};
pub use value::{Object, Value, format_number};
