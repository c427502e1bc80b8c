pub mod block;
pub mod daemon;
pub mod helpers;
pub mod list;
