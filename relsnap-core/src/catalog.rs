/*!
Entity catalog: the single registry of everything that can be snapshotted.

Each [`EntityDef`] describes how to read an entity (base table, display-only
joins, ordering), where it sits in the foreign-key dependency order, and which
of its fields need special handling. Both "backup all" and "restore all" iterate
this table; adding an entity is adding one entry to [`STANDARD_ENTITIES`].
*/

use crate::{Result, SnapshotError};

/// A join that pulls human-readable fields from a related table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayJoin {
    /// Related table
    pub table: &'static str,
    /// Foreign key column on the base table
    pub local_key: &'static str,
    /// Referenced column on the related table
    pub foreign_key: &'static str,
    /// `(related column, exported alias)` pairs
    pub fields: &'static [(&'static str, &'static str)],
}

/// Read query description for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityQuery {
    pub table: &'static str,
    pub joins: &'static [DisplayJoin],
    /// Base-table column giving a deterministic export order
    pub order_by: Option<&'static str>,
}

impl EntityQuery {
    /// Aliases of every display-only field the joins add
    pub fn display_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.joins
            .iter()
            .flat_map(|join| join.fields.iter().map(|(_, alias)| *alias))
    }
}

/// How a sensitive field is recovered when decryption fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// Login credential: replaced by a placeholder that forces a reset
    Credential,
    /// Persistent session token: cleared to null
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveField {
    pub name: &'static str,
    pub kind: SecretKind,
}

/// Catalog entry for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDef {
    pub name: &'static str,
    pub query: EntityQuery,
    /// Strictly greater than the rank of every entity in `depends_on`
    pub rank: u8,
    pub depends_on: &'static [&'static str],
    pub sensitive: &'static [SensitiveField],
    /// Never replayed on restore
    pub transient: bool,
    /// Counted in the manifest's aggregate record total
    pub primary: bool,
}

impl EntityDef {
    pub fn table(&self) -> &'static str {
        self.query.table
    }

    pub fn is_display_field(&self, field: &str) -> bool {
        self.query.display_fields().any(|alias| alias == field)
    }
}

const fn entity(name: &'static str, rank: u8) -> EntityDef {
    EntityDef {
        name,
        query: EntityQuery {
            table: name,
            joins: &[],
            order_by: Some("id"),
        },
        rank,
        depends_on: &[],
        sensitive: &[],
        transient: false,
        primary: false,
    }
}

const fn join(
    table: &'static str,
    local_key: &'static str,
    fields: &'static [(&'static str, &'static str)],
) -> DisplayJoin {
    DisplayJoin {
        table,
        local_key,
        foreign_key: "id",
        fields,
    }
}

const CITY_NAME: DisplayJoin = join("cities", "city_id", &[("name", "city_name")]);

/// The registered entities, in export order
pub const STANDARD_ENTITIES: &[EntityDef] = &[
    // Reference data
    EntityDef {
        primary: true,
        ..entity("countries", 0)
    },
    EntityDef {
        query: EntityQuery {
            table: "cities",
            joins: &[join(
                "countries",
                "country_id",
                &[("name", "country_name"), ("code", "country_code")],
            )],
            order_by: Some("id"),
        },
        depends_on: &["countries"],
        primary: true,
        ..entity("cities", 1)
    },
    EntityDef {
        query: EntityQuery {
            table: "neighborhoods",
            joins: &[CITY_NAME],
            order_by: Some("id"),
        },
        depends_on: &["cities"],
        primary: true,
        ..entity("neighborhoods", 2)
    },
    entity("categories", 0),
    entity("tags", 0),
    // Users and content
    EntityDef {
        sensitive: &[
            SensitiveField {
                name: "password",
                kind: SecretKind::Credential,
            },
            SensitiveField {
                name: "remember_token",
                kind: SecretKind::Token,
            },
        ],
        primary: true,
        ..entity("users", 0)
    },
    EntityDef {
        query: EntityQuery {
            table: "companies",
            joins: &[CITY_NAME],
            order_by: Some("id"),
        },
        depends_on: &["cities"],
        primary: true,
        ..entity("companies", 2)
    },
    EntityDef {
        query: EntityQuery {
            table: "articles",
            joins: &[CITY_NAME, join("users", "user_id", &[("name", "author_name")])],
            order_by: Some("published_at"),
        },
        depends_on: &["cities", "users"],
        primary: true,
        ..entity("articles", 2)
    },
    EntityDef {
        query: EntityQuery {
            table: "deals",
            joins: &[
                join("companies", "company_id", &[("name", "company_name")]),
                CITY_NAME,
            ],
            order_by: Some("id"),
        },
        depends_on: &["companies", "cities"],
        primary: true,
        ..entity("deals", 3)
    },
    EntityDef {
        query: EntityQuery {
            table: "jobs",
            joins: &[
                join("companies", "company_id", &[("name", "company_name")]),
                join("categories", "category_id", &[("name", "category_name")]),
                CITY_NAME,
            ],
            order_by: Some("id"),
        },
        depends_on: &["companies", "categories", "cities"],
        primary: true,
        ..entity("jobs", 3)
    },
    EntityDef {
        query: EntityQuery {
            table: "article_tag",
            joins: &[],
            order_by: Some("article_id"),
        },
        depends_on: &["articles", "tags"],
        ..entity("article_tag", 3)
    },
    EntityDef {
        query: EntityQuery {
            table: "favorites",
            joins: &[
                join("users", "user_id", &[("name", "user_name"), ("email", "user_email")]),
                join("jobs", "job_id", &[("title", "job_title")]),
            ],
            order_by: Some("id"),
        },
        depends_on: &["users", "jobs"],
        ..entity("favorites", 4)
    },
    EntityDef {
        query: EntityQuery {
            table: "job_user_interactions",
            joins: &[
                join("users", "user_id", &[("name", "user_name")]),
                join("jobs", "job_id", &[("title", "job_title")]),
            ],
            order_by: Some("id"),
        },
        depends_on: &["users", "jobs"],
        ..entity("job_user_interactions", 4)
    },
    entity("newsletter_subscribers", 0),
    entity("settings", 0),
    // Operational data
    EntityDef {
        query: EntityQuery {
            table: "security_logs",
            joins: &[join("users", "user_id", &[("email", "user_email")])],
            order_by: Some("created_at"),
        },
        depends_on: &["users"],
        ..entity("security_logs", 1)
    },
    entity("banned_ips", 0),
    EntityDef {
        query: EntityQuery {
            table: "cache",
            joins: &[],
            order_by: Some("key"),
        },
        transient: true,
        ..entity("cache", 0)
    },
    EntityDef {
        depends_on: &["users"],
        transient: true,
        ..entity("sessions", 1)
    },
    EntityDef {
        query: EntityQuery {
            table: "password_reset_tokens",
            joins: &[],
            order_by: Some("email"),
        },
        transient: true,
        ..entity("password_reset_tokens", 0)
    },
];

/// Registry of snapshot-able entities
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    entries: Vec<EntityDef>,
}

impl EntityCatalog {
    /// Build a catalog from explicit entries, checking rank consistency
    pub fn new(entries: Vec<EntityDef>) -> Result<Self> {
        let catalog = Self { entries };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog of the standard application schema
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_ENTITIES.to_vec(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&EntityDef> {
        self.entries.iter().find(|def| def.name == name)
    }

    /// Look up an entity or fail with [`SnapshotError::UnknownEntity`]
    pub fn require(&self, name: &str) -> Result<&EntityDef> {
        self.get(name)
            .ok_or_else(|| SnapshotError::UnknownEntity(name.to_string()))
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = &EntityDef> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|def| def.name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by non-decreasing dependency rank
    ///
    /// The sort is stable, so entities of equal rank keep registration order.
    pub fn restore_order(&self) -> Vec<&EntityDef> {
        let mut ordered: Vec<&EntityDef> = self.entries.iter().collect();
        ordered.sort_by_key(|def| def.rank);
        ordered
    }

    /// Check names are unique and every dependency has a strictly lower rank
    pub fn validate(&self) -> Result<()> {
        for (index, def) in self.entries.iter().enumerate() {
            if self.entries[..index].iter().any(|other| other.name == def.name) {
                return Err(SnapshotError::validation(format!(
                    "entity '{}' is registered twice",
                    def.name
                )));
            }

            for dependency in def.depends_on {
                let target = self.get(dependency).ok_or_else(|| {
                    SnapshotError::validation(format!(
                        "entity '{}' depends on unregistered entity '{}'",
                        def.name, dependency
                    ))
                })?;
                if target.rank >= def.rank {
                    return Err(SnapshotError::validation(format!(
                        "entity '{}' (rank {}) must rank above its dependency '{}' (rank {})",
                        def.name, def.rank, target.name, target.rank
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for EntityCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_consistent() {
        let catalog = EntityCatalog::standard();
        assert_eq!(catalog.len(), 20);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_restore_order_is_non_decreasing() {
        let catalog = EntityCatalog::standard();
        let ranks: Vec<u8> = catalog.restore_order().iter().map(|def| def.rank).collect();
        assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_dependencies_restore_before_dependents() {
        let catalog = EntityCatalog::standard();
        let order: Vec<&str> = catalog.restore_order().iter().map(|def| def.name).collect();
        let position = |name: &str| order.iter().position(|n| *n == name).unwrap();

        assert!(position("countries") < position("cities"));
        assert!(position("cities") < position("articles"));
        assert!(position("companies") < position("jobs"));
        assert!(position("jobs") < position("favorites"));
    }

    #[test]
    fn test_display_fields_come_from_joins() {
        let catalog = EntityCatalog::standard();
        let cities = catalog.require("cities").unwrap();
        let fields: Vec<&str> = cities.query.display_fields().collect();
        assert_eq!(fields, vec!["country_name", "country_code"]);
        assert!(cities.is_display_field("country_code"));
        assert!(!cities.is_display_field("country_id"));
    }

    #[test]
    fn test_transient_entities() {
        let catalog = EntityCatalog::standard();
        let transient: Vec<&str> = catalog
            .iter()
            .filter(|def| def.transient)
            .map(|def| def.name)
            .collect();
        assert_eq!(transient, vec!["cache", "sessions", "password_reset_tokens"]);
    }

    #[test]
    fn test_unknown_entity() {
        let catalog = EntityCatalog::standard();
        let err = catalog.require("planets").unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownEntity(name) if name == "planets"));
    }

    #[test]
    fn test_rank_violation_is_rejected() {
        let bad = vec![
            EntityDef {
                depends_on: &["parents"],
                ..entity("children", 0)
            },
            entity("parents", 0),
        ];
        let err = EntityCatalog::new(bad).unwrap_err();
        assert!(err.to_string().contains("must rank above"));
    }

    #[test]
    fn test_missing_dependency_is_rejected() {
        let bad = vec![EntityDef {
            depends_on: &["ghosts"],
            ..entity("children", 1)
        }];
        assert!(EntityCatalog::new(bad).is_err());
    }
}
