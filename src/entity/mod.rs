pub mod branches;
pub mod categories;
pub mod payments;
pub mod products;
pub mod stock_movements;
pub mod transaction_items;
pub mod transactions;
pub mod users;

pub use branches::Entity as Branches;
pub use categories::Entity as Categories;
pub use payments::Entity as Payments;
pub use products::Entity as Products;
pub use stock_movements::Entity as StockMovements;
pub use transaction_items::Entity as TransactionItems;
pub use transactions::Entity as Transactions;
pub use users::Entity as Users;
