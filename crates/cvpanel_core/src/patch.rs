//! The patch: a set of connected module instances.
//!
//! A `Patch` is built from its serialized [`PatchGraph`] form, processed one
//! frame at a time from a single thread, and can be snapshotted back into a
//! `PatchGraph` so the current state (including params a module has moved
//! itself, like mirrored knobs) persists.

use crate::error::{Error, Result};
use crate::types::{ModuleState, PatchGraph, SampleableMap};

/// A running patch of connected modules.
#[derive(Default)]
pub struct Patch {
    pub sampleables: SampleableMap,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate and connect every module in a graph.
    ///
    /// Fails on unknown module types, duplicate ids, or params that don't
    /// parse as the module's concrete params type. Cables to missing modules
    /// are not an error; they resolve to silence.
    pub fn from_graph(graph: &PatchGraph, sample_rate: f32) -> Result<Self> {
        let constructors = crate::dsp::get_constructors();
        let mut patch = Patch::new();

        for state in &graph.modules {
            let constructor = constructors
                .get(state.module_type.as_str())
                .ok_or_else(|| Error::UnknownModuleType(state.module_type.clone()))?;
            if patch.sampleables.contains_key(&state.id) {
                return Err(Error::DuplicateModuleId(state.id.clone()));
            }

            let module = constructor(&state.id, sample_rate);
            module.try_update_params(state.params.clone())?;
            patch.sampleables.insert(state.id.clone(), module);
        }

        for module in patch.sampleables.values() {
            module.connect(&patch);
        }

        Ok(patch)
    }

    /// Advance every module by one frame: open the frame boundary, then
    /// update all. Reads between frames are memoized and do not advance
    /// module state.
    pub fn process_frame(&self) {
        for module in self.sampleables.values() {
            module.tick();
        }
        for module in self.sampleables.values() {
            module.update();
        }
    }

    /// Serialize the live patch back into graph form, modules sorted by id.
    pub fn snapshot(&self) -> Result<PatchGraph> {
        let mut modules = Vec::with_capacity(self.sampleables.len());
        for (id, module) in &self.sampleables {
            modules.push(ModuleState {
                id: id.clone(),
                module_type: module.get_module_type().to_string(),
                params: module.save_params()?,
            });
        }
        modules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(PatchGraph { modules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PolyBus;
    use crate::types::Sampleable;
    use serde_json::json;
    use std::sync::Arc;

    struct DummySampleable {
        id: String,
        voltage: f32,
    }

    impl Sampleable for DummySampleable {
        fn get_id(&self) -> &str {
            &self.id
        }

        fn tick(&self) {}

        fn update(&self) {}

        fn get_poly_sample(&self, _port: &str) -> crate::error::Result<PolyBus> {
            Ok(PolyBus::mono(self.voltage))
        }

        fn get_module_type(&self) -> &'static str {
            "dummy"
        }

        fn try_update_params(&self, _params: serde_json::Value) -> crate::error::Result<()> {
            Ok(())
        }

        fn save_params(&self) -> crate::error::Result<serde_json::Value> {
            Ok(json!({}))
        }

        fn connect(&self, _patch: &Patch) {}
    }

    #[test]
    fn empty_patch() {
        let patch = Patch::new();
        assert!(patch.sampleables.is_empty());
        patch.process_frame();
    }

    #[test]
    fn from_graph_rejects_unknown_module_type() {
        let graph = PatchGraph {
            modules: vec![ModuleState {
                id: "x".to_string(),
                module_type: "reverb".to_string(),
                params: json!({}),
            }],
        };
        let err = Patch::from_graph(&graph, 48000.0)
            .err()
            .expect("unknown module type should fail");
        match err {
            Error::UnknownModuleType(t) => assert_eq!(t, "reverb"),
            other => panic!("expected UnknownModuleType, got {other:?}"),
        }
    }

    #[test]
    fn from_graph_rejects_duplicate_ids() {
        let graph = PatchGraph {
            modules: vec![
                ModuleState {
                    id: "a".to_string(),
                    module_type: "source".to_string(),
                    params: json!({}),
                },
                ModuleState {
                    id: "a".to_string(),
                    module_type: "source".to_string(),
                    params: json!({}),
                },
            ],
        };
        assert!(matches!(
            Patch::from_graph(&graph, 48000.0),
            Err(Error::DuplicateModuleId(_))
        ));
    }

    #[test]
    fn from_graph_rejects_bad_params() {
        let graph = PatchGraph {
            modules: vec![ModuleState {
                id: "a".to_string(),
                module_type: "source".to_string(),
                params: json!({ "source": { "type": "nonsense" } }),
            }],
        };
        assert!(matches!(
            Patch::from_graph(&graph, 48000.0),
            Err(Error::BadParams { .. })
        ));
    }

    #[test]
    fn snapshot_is_sorted_and_round_trips() {
        let graph = PatchGraph {
            modules: vec![
                ModuleState {
                    id: "b".to_string(),
                    module_type: "source".to_string(),
                    params: json!({ "source": 1.5 }),
                },
                ModuleState {
                    id: "a".to_string(),
                    module_type: "source".to_string(),
                    params: json!({ "source": [0.5, 2.5] }),
                },
            ],
        };
        let patch = Patch::from_graph(&graph, 48000.0).unwrap();
        let snapshot = patch.snapshot().unwrap();

        assert_eq!(snapshot.modules.len(), 2);
        assert_eq!(snapshot.modules[0].id, "a");
        assert_eq!(snapshot.modules[1].id, "b");
        assert_eq!(snapshot.modules[1].params["source"], json!(1.5));

        // Rebuilding from the snapshot preserves behavior.
        let rebuilt = Patch::from_graph(&snapshot, 48000.0).unwrap();
        rebuilt.process_frame();
        let bus = rebuilt.sampleables["a"].get_poly_sample("output").unwrap();
        assert_eq!(bus.get(1), 2.5);
    }

    #[test]
    fn dummy_sampleable_in_patch() {
        let mut patch = Patch::new();
        patch.sampleables.insert(
            "d".to_string(),
            Arc::new(Box::new(DummySampleable {
                id: "d".to_string(),
                voltage: 4.0,
            })),
        );
        patch.process_frame();
        let bus = patch.sampleables["d"].get_poly_sample("output").unwrap();
        assert_eq!(bus.get(0), 4.0);
    }
}
