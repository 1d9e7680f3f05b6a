//! Database models, one file per aggregate, re-exported at `crate::db::models`.

pub mod attendance;
pub mod event;
pub mod reminder;
pub mod roster;
pub mod schedule;
pub mod template;

pub use self::attendance::*;
pub use self::event::*;
pub use self::reminder::*;
pub use self::roster::*;
pub use self::schedule::*;
pub use self::template::*;
