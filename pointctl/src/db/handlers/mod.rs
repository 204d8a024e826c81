pub mod points;
pub mod pricing;
pub mod reviews;
pub mod settings;
pub mod users;
