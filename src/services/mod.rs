// Catalog and cart
pub mod cart;
pub mod catalog;

// Pricing
pub mod promotions;

// Checkout and orders
pub mod checkout;
pub mod orders;
pub mod payments;

// Accounts
pub mod users;
