use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Button, JujubeError, Result};

/// Physical input that can be bound to a logical button.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputBinding {
    /// Keyboard key, identified by the name the windowing backend reports.
    Key(String),
    Controller { controller: u32, button: u32 },
}

/// A single entry of the key mapping as it appears in the preferences file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    pub button: Button,
    pub input: InputBinding,
}

/// Routes physical inputs to the sixteen logical buttons.
///
/// The descriptor list is what gets persisted; the lookup table is rebuilt
/// from it whenever the mapping is deserialized or modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<MappingDescriptor>", into = "Vec<MappingDescriptor>")]
pub struct KeyMapping {
    descriptors: Vec<MappingDescriptor>,
    lookup: HashMap<InputBinding, Button>,
}

const DEFAULT_KEYS: [&str; 16] = [
    "4", "5", "6", "7", "R", "T", "Y", "U", "F", "G", "H", "J", "V", "B", "N", "M",
];

impl Default for KeyMapping {
    fn default() -> Self {
        Button::all()
            .zip(DEFAULT_KEYS)
            .map(|(button, key)| MappingDescriptor {
                button,
                input: InputBinding::Key(key.to_string()),
            })
            .collect::<Vec<_>>()
            .into()
    }
}

impl From<Vec<MappingDescriptor>> for KeyMapping {
    fn from(descriptors: Vec<MappingDescriptor>) -> Self {
        let mut mapping = Self {
            descriptors,
            lookup: HashMap::new(),
        };
        mapping.rebuild();
        mapping
    }
}

impl From<KeyMapping> for Vec<MappingDescriptor> {
    fn from(mapping: KeyMapping) -> Self {
        mapping.descriptors
    }
}

impl KeyMapping {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn descriptors(&self) -> &[MappingDescriptor] {
        &self.descriptors
    }

    /// Binds `input` to `button`, replacing any previous binding of that input.
    pub fn bind(&mut self, input: InputBinding, button: Button) {
        self.descriptors.retain(|descriptor| descriptor.input != input);
        self.descriptors.push(MappingDescriptor { button, input });
        self.rebuild();
    }

    pub fn key_to_button(&self, key: &str) -> Option<Button> {
        self.lookup.get(&InputBinding::Key(key.to_string())).copied()
    }

    pub fn controller_to_button(&self, controller: u32, button: u32) -> Option<Button> {
        self.lookup
            .get(&InputBinding::Controller { controller, button })
            .copied()
    }

    /// First keyboard key bound to `button`, if any.
    pub fn key_for(&self, button: Button) -> Option<&str> {
        self.descriptors
            .iter()
            .find_map(|descriptor| match &descriptor.input {
                InputBinding::Key(key) if descriptor.button == button => Some(key.as_str()),
                _ => None,
            })
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&InputBinding, Button> = HashMap::new();
        for descriptor in &self.descriptors {
            if let Some(previous) = seen.insert(&descriptor.input, descriptor.button) {
                if previous != descriptor.button {
                    return Err(JujubeError::InvalidConfig(format!(
                        "{:?} is bound to both {previous} and {}",
                        descriptor.input, descriptor.button
                    )));
                }
            }
        }
        Ok(())
    }

    fn rebuild(&mut self) {
        self.lookup = self
            .descriptors
            .iter()
            .map(|descriptor| (descriptor.input.clone(), descriptor.button))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button(index: u8) -> Button {
        Button::new(index).unwrap()
    }

    #[test]
    fn default_mapping_covers_the_grid() {
        let mapping = KeyMapping::default();
        assert_eq!(mapping.key_to_button("4"), Some(button(0)));
        assert_eq!(mapping.key_to_button("M"), Some(button(15)));
        assert_eq!(mapping.key_to_button("Q"), None);
        assert_eq!(mapping.key_for(button(5)), Some("T"));
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn rebinding_replaces_the_previous_entry() {
        let mut mapping = KeyMapping::default();
        mapping.bind(InputBinding::Key("4".into()), button(3));
        mapping.bind(
            InputBinding::Controller {
                controller: 0,
                button: 2,
            },
            button(9),
        );

        assert_eq!(mapping.key_to_button("4"), Some(button(3)));
        assert_eq!(mapping.controller_to_button(0, 2), Some(button(9)));
        assert_eq!(mapping.descriptors().len(), 17);
    }

    #[test]
    fn round_trips_through_the_descriptor_list() {
        let mapping = KeyMapping::default();
        let json = serde_json::to_string(&mapping).unwrap();
        let restored: KeyMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.key_to_button("H"), Some(button(10)));
    }

    #[test]
    fn conflicting_bindings_are_rejected() {
        let mapping = KeyMapping::from(vec![
            MappingDescriptor {
                button: button(0),
                input: InputBinding::Key("A".into()),
            },
            MappingDescriptor {
                button: button(1),
                input: InputBinding::Key("A".into()),
            },
        ]);
        assert!(mapping.validate().is_err());
    }
}
