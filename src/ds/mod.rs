pub mod arena;
pub mod freq_list;

pub use arena::{Arena, Handle};
pub use freq_list::{FreqList, KeyHandle};
