pub mod iface;
pub mod kernel_build;
pub mod model_fetch;
pub mod plugin_sync;
pub mod server_launch;
pub mod system_packages;
