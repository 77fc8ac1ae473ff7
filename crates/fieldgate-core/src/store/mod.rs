// ── Store ──
//
// Reactive entity storage plus the write gates that keep the tenant
// hierarchy consistent.

mod cadence;
pub(crate) mod collection;
mod data_store;
mod devices;
mod observations;
mod tenants;

pub use data_store::DataStore;
