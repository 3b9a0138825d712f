pub mod incident;
pub mod event;
pub mod tag;
pub mod acknowledgement;
pub mod source;
pub mod notification;

pub use incident::*;
pub use event::*;
pub use tag::*;
pub use acknowledgement::*;
pub use source::*;
pub use notification::*;
