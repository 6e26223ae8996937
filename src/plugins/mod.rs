//! Built-in plugins. Each module exposes `register`, called once when the global registry is
//! built. Adding a plugin means adding its module here and a line to [register_all].

pub mod default;
pub mod eleven_eyes;

use crate::registry::RegistryBuilder;

/// Register every built-in plugin, in a fixed order.
pub fn register_all(builder: &mut RegistryBuilder) {
    default::register(builder);
    eleven_eyes::register(builder);
}
