pub mod auth;
pub mod branches;
pub mod categories;
pub mod products;
pub mod transactions;
pub mod users;
