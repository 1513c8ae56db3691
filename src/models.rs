pub mod earnings;
pub mod referrals;
pub mod tasks;
pub mod users;
