/*!
Adapters between the reconciliation engine and the machine it runs on
*/

pub mod config;
pub mod elevation;
pub mod menu;
pub mod notifier;
pub mod registry;
