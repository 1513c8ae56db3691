pub mod earnings;
pub mod firebase;
pub mod memory;
pub mod store;
pub mod tasks;
pub mod users;
