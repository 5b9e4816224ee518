pub mod completion;
pub mod database;
pub mod entities;
pub mod repositories;
pub mod settings;
pub mod telegram;
pub mod traits;
pub mod yookassa;
