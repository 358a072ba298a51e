pub mod hashmap;
pub mod string_list;

pub use hashmap::GitHashMapExt;
pub use string_list::{StringList, StringListItem};
