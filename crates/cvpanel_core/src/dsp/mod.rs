use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod panel;
pub mod source;
pub mod utils;

pub fn get_constructors() -> HashMap<String, SampleableConstructor> {
    let mut map = HashMap::new();
    source::Source::install_constructor(&mut map);
    panel::Panel::install_constructor(&mut map);
    map
}

/// Returns a map of `module_type` -> typed params validator.
///
/// A validator attempts to deserialize a module's `ModuleState.params` JSON
/// into that module's concrete params struct, for patch validation before
/// anything is instantiated.
pub fn get_param_validators() -> HashMap<String, ParamsValidator> {
    let mut map = HashMap::new();
    source::Source::install_params_validator(&mut map);
    panel::Panel::install_params_validator(&mut map);
    map
}

pub fn schema() -> Vec<ModuleSchema> {
    vec![source::Source::schema(), panel::Panel::schema()]
}
