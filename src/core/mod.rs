pub mod assistant;
pub mod entitlement;
pub mod errors;
pub mod locks;
pub mod menus;
pub mod notices;
pub mod payments;
pub mod plans;
pub mod services;
pub mod styles;
pub mod traits;
