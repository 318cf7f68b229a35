pub mod account;
pub mod courses;
pub mod events;
pub mod lessons;
pub mod progress;
pub mod promotions;
pub mod referrals;
