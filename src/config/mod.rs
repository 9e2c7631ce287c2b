// ============================================================================
// Mapping Configuration
// ============================================================================
//
// Static configuration surface, loaded once at startup and read-only after
// that. Multiple sources are merged in order; later sources overwrite
// earlier ones on key collision (the known-statement set is unioned).
//
// ============================================================================

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// One configuration source, as loaded from a file or built in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingSource {
    /// Short alias -> canonical entity type name.
    #[serde(default)]
    pub type_aliases: HashMap<String, String>,

    /// Known physical statement names. Resolution fails for anything else.
    #[serde(default)]
    pub statements: HashSet<String>,

    /// Entity type -> SQL alias prefixed onto its columns in compiled
    /// fragments (`A.NAME_` instead of `NAME_`).
    #[serde(default)]
    pub sql_class_aliases: HashMap<String, String>,

    /// `"Type.field"` -> physical column name.
    #[serde(default)]
    pub field_aliases: HashMap<String, String>,

    /// `"<dbIdentifier>_<logicalName>"` -> physical statement name.
    #[serde(default)]
    pub db_overrides: HashMap<String, String>,

    /// Logical entity type -> physical type sharing its statement set.
    #[serde(default)]
    pub entity_remap: HashMap<String, String>,
}

impl MappingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one source from its JSON form, as deployed next to the
    /// statement files.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn type_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.type_aliases
            .insert(alias.to_string(), canonical.to_string());
        self
    }

    pub fn statement(mut self, name: &str) -> Self {
        self.statements.insert(name.to_string());
        self
    }

    pub fn sql_class_alias(mut self, entity_type: &str, alias: &str) -> Self {
        self.sql_class_aliases
            .insert(entity_type.to_string(), alias.to_string());
        self
    }

    pub fn field_alias(mut self, entity_type: &str, field: &str, column: &str) -> Self {
        self.field_aliases
            .insert(format!("{entity_type}.{field}"), column.to_string());
        self
    }

    pub fn db_override(mut self, db_identifier: &str, logical: &str, physical: &str) -> Self {
        self.db_overrides
            .insert(format!("{db_identifier}_{logical}"), physical.to_string());
        self
    }

    pub fn remap_entity(mut self, logical: &str, physical: &str) -> Self {
        self.entity_remap
            .insert(logical.to_string(), physical.to_string());
        self
    }
}

/// Merged, read-only mapping configuration.
#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    type_aliases: HashMap<String, String>,
    statements: HashSet<String>,
    sql_class_aliases: HashMap<String, String>,
    field_aliases: HashMap<String, String>,
    db_overrides: HashMap<String, String>,
    entity_remap: HashMap<String, String>,
}

impl MappingConfig {
    pub fn merge(sources: impl IntoIterator<Item = MappingSource>) -> Self {
        let mut merged = Self::default();
        for source in sources {
            merged.type_aliases.extend(source.type_aliases);
            merged.statements.extend(source.statements);
            merged.sql_class_aliases.extend(source.sql_class_aliases);
            merged.field_aliases.extend(source.field_aliases);
            merged.db_overrides.extend(source.db_overrides);
            merged.entity_remap.extend(source.entity_remap);
        }
        merged
    }

    /// Canonical entity type for a possibly aliased name.
    pub fn canonical_type<'a>(&'a self, name: &'a str) -> &'a str {
        self.type_aliases.get(name).map_or(name, String::as_str)
    }

    pub fn has_statement(&self, name: &str) -> bool {
        self.statements.contains(name)
    }

    pub fn db_override(&self, key: &str) -> Option<&str> {
        self.db_overrides.get(key).map(String::as_str)
    }

    /// Physical entity type whose statement set this logical type uses.
    pub fn physical_type<'a>(&'a self, entity_type: &'a str) -> &'a str {
        self.entity_remap
            .get(entity_type)
            .map_or(entity_type, String::as_str)
    }

    /// Qualified column name for a `(type, field)` pair: the field alias if
    /// one is configured, prefixed with the type's SQL alias when present.
    pub fn column_for(&self, entity_type: &str, field: &str) -> String {
        let key = format!("{entity_type}.{field}");
        let column = self
            .field_aliases
            .get(&key)
            .map_or(field, String::as_str);
        match self.sql_class_aliases.get(entity_type) {
            Some(alias) => format!("{alias}.{column}"),
            None => column.to_string(),
        }
    }
}
