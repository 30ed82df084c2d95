use std::collections::HashSet;

/// Entity abstraction for pulsed
///
/// All entities (alarm panels, binary sensors) implement the Entity trait.
///
/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Human-readable name of the entity
    fn name(&self) -> String;

    /// Identifier that stays stable across restarts
    fn unique_id(&self) -> String;

    /// Return the platform type of this entity (e.g. "alarm_control_panel")
    fn platform(&self) -> &'static str;

    /// Material Design icon for the current state, if any
    fn icon(&self) -> Option<String> {
        None
    }

    /// Integration-specific attributes reported alongside the state
    fn extra_state_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    /// Data attribution shown next to the entity
    fn attribution(&self) -> Option<&'static str> {
        None
    }

    /// Serialize current state to JSON for Engine storage
    fn state_json(&self) -> serde_json::Value;

    /// Entity id used for routing, e.g. `binary_sensor.front_door`.
    fn entity_id(&self) -> String {
        suggest_entity_id(self.platform(), &self.name())
    }
}

/// Entity id derived from the platform and display name alone.
///
/// Two entities with the same name get the same suggestion; run it through
/// [`EntityIdRegistry::assign`] before registering with the engine.
pub fn suggest_entity_id(platform: &str, name: &str) -> String {
    format!("{}.{}", platform, slugify(name))
}

/// Entity ids handed out so far.
///
/// A suggested id that is already taken gets a `_2`, `_3`, ... suffix.
#[derive(Debug, Default)]
pub struct EntityIdRegistry {
    taken: HashSet<String>,
}

impl EntityIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a unique id based on `suggested`.
    pub fn assign(&mut self, suggested: &str) -> String {
        if self.taken.insert(suggested.to_string()) {
            return suggested.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", suggested, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Transliterate `name` to ASCII and lowercase it, collapsing every run of
/// non-alphanumeric characters into a single `_` trimmed from both ends.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode::deunicode(name);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("ADT Home"), "adt_home");
        assert_eq!(slugify("ADT  Robert's Lake-House "), "adt_robert_s_lake_house");
        assert_eq!(slugify("--Front Door--"), "front_door");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_transliterates() {
        assert_eq!(slugify("ADT Café Résidence"), "adt_cafe_residence");
        assert_eq!(slugify("Große Straße"), "grosse_strasse");
    }

    #[test]
    fn test_registry_suffixes_duplicates() {
        let mut ids = EntityIdRegistry::new();
        assert_eq!(ids.assign("binary_sensor.front_door"), "binary_sensor.front_door");
        assert_eq!(ids.assign("binary_sensor.front_door"), "binary_sensor.front_door_2");
        assert_eq!(ids.assign("binary_sensor.front_door"), "binary_sensor.front_door_3");
        assert_eq!(ids.assign("binary_sensor.back_door"), "binary_sensor.back_door");
    }

    #[test]
    fn test_registry_skips_taken_suffix() {
        let mut ids = EntityIdRegistry::new();
        ids.assign("alarm_control_panel.adt_home_2");
        ids.assign("alarm_control_panel.adt_home");
        assert_eq!(
            ids.assign("alarm_control_panel.adt_home"),
            "alarm_control_panel.adt_home_3"
        );
    }
}
