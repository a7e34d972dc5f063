mod local;
mod stream;

pub use local::{MemberReader, open_member};
pub use stream::{Checkpoint, StreamReader};
