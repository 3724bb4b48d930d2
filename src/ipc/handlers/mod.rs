pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod fees;
pub mod ledger;
pub mod notifications;
pub mod payments;
pub mod payroll;
pub mod schools;
pub mod staff;
pub mod students;
