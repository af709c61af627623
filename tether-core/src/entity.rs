//! Entity metadata: primary-key values, table/field descriptors and the
//! `Entity` capability every cacheable record implements.

use crate::{StorageError, TetherResult};
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

// ============================================================================
// KEY VALUES
// ============================================================================

/// Type-erased primary-key value.
///
/// Object caches serve exactly one entity type, so the key alone identifies an
/// entry; the variant only has to preserve equality and ordering of the typed key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheKey {
    Int(i64),
    Text(String),
    Uuid(Uuid),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Int(n) => write!(f, "{}", n),
            CacheKey::Text(s) => write!(f, "{:?}", s),
            CacheKey::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// A typed primary-key value.
pub trait EntityKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Erase the key for cache and storage indexing.
    fn cache_key(&self) -> CacheKey;

    /// Build a key from a storage sequence value, for generated ids.
    /// Key types that cannot be generated return `None`.
    fn from_sequence(_sequence: i64) -> Option<Self> {
        None
    }
}

impl EntityKey for i64 {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Int(*self)
    }

    fn from_sequence(sequence: i64) -> Option<Self> {
        Some(sequence)
    }
}

impl EntityKey for i32 {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Int(i64::from(*self))
    }

    fn from_sequence(sequence: i64) -> Option<Self> {
        i32::try_from(sequence).ok()
    }
}

impl EntityKey for String {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Text(self.clone())
    }
}

impl EntityKey for Uuid {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Uuid(*self)
    }
}

/// Key type of entities without a primary-key field. Uninhabited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoKey {}

impl EntityKey for NoKey {
    fn cache_key(&self) -> CacheKey {
        match *self {}
    }
}

// ============================================================================
// TABLE METADATA
// ============================================================================

/// Mapping metadata for one persisted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name on the record
    pub name: &'static str,
    /// Column name in the table
    pub column: &'static str,
    /// Whether this field is the primary key
    pub id: bool,
    /// Whether the store assigns the key on create
    pub generated_id: bool,
}

impl FieldDescriptor {
    /// A plain data column.
    pub const fn column(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            id: false,
            generated_id: false,
        }
    }

    /// A caller-assigned primary key.
    pub const fn id(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            id: true,
            generated_id: false,
        }
    }

    /// A store-assigned primary key.
    pub const fn generated_id(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            id: true,
            generated_id: true,
        }
    }

    /// Map the field to a differently named column.
    pub fn with_column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }
}

/// Mapping metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    entity_name: &'static str,
    table_name: String,
    fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    /// Describe an entity; the table name defaults to the lowercased entity name.
    pub fn new(entity_name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            entity_name,
            table_name: entity_name.to_lowercase(),
            fields,
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// The primary-key field.
    ///
    /// Fails with [`StorageError::NoPrimaryKey`] unless exactly one field is
    /// marked as the key.
    pub fn id_field(&self) -> TetherResult<&FieldDescriptor> {
        let mut ids = self.fields.iter().filter(|f| f.id);
        match (ids.next(), ids.next()) {
            (Some(field), None) => Ok(field),
            _ => Err(StorageError::NoPrimaryKey {
                entity: self.entity_name.to_string(),
            }
            .into()),
        }
    }

    pub fn has_id(&self) -> bool {
        self.id_field().is_ok()
    }
}

// ============================================================================
// ENTITY CAPABILITY
// ============================================================================

/// A persisted record the data-access layer can map and the object cache can hold.
///
/// # Implementation Requirements
///
/// - `table()` must describe the same fields for every call
/// - `id()` returns `None` while a generated key is unassigned, and always for
///   key-less types
/// - `apply_fields_from` must leave `self` observably equal to `other`; the
///   default clones every field
pub trait Entity: Clone + Send + Sync + 'static {
    /// Primary-key type; [`NoKey`] for key-less types.
    type Id: EntityKey;

    /// Mapping metadata for this type.
    fn table() -> TableDescriptor;

    /// Current primary-key value.
    fn id(&self) -> Option<Self::Id>;

    /// Overwrite the primary-key value.
    fn set_id(&mut self, id: Self::Id);

    /// Copy the persisted field values of `other` onto `self` in place.
    fn apply_fields_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Runtime identity of this entity type.
    fn kind() -> EntityKind {
        EntityKind::of::<Self>()
    }
}

/// Runtime identity of an entity type, used to bind caches to one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKind {
    type_id: TypeId,
    type_name: &'static str,
}

impl EntityKind {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TetherError;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: Option<i32>,
        label: String,
    }

    impl Entity for Widget {
        type Id = i32;

        fn table() -> TableDescriptor {
            TableDescriptor::new(
                "Widget",
                vec![
                    FieldDescriptor::generated_id("id"),
                    FieldDescriptor::column("label"),
                ],
            )
        }

        fn id(&self) -> Option<i32> {
            self.id
        }

        fn set_id(&mut self, id: i32) {
            self.id = Some(id);
        }
    }

    #[test]
    fn test_id_field_found() {
        let table = Widget::table();
        let field = table.id_field().unwrap();
        assert_eq!(field.name, "id");
        assert!(field.generated_id);
        assert_eq!(table.table_name(), "widget");
    }

    #[test]
    fn test_id_field_missing_is_storage_error() {
        let table = TableDescriptor::new("NoId", vec![FieldDescriptor::column("stuff")]);
        let err = table.id_field().unwrap_err();
        assert!(matches!(
            err,
            TetherError::Storage(StorageError::NoPrimaryKey { ref entity }) if entity == "NoId"
        ));
        assert!(!table.has_id());
    }

    #[test]
    fn test_id_field_rejects_composite_keys() {
        let table = TableDescriptor::new(
            "Pair",
            vec![FieldDescriptor::id("left"), FieldDescriptor::id("right")],
        );
        assert!(table.id_field().is_err());
    }

    #[test]
    fn test_field_column_override() {
        let field = FieldDescriptor::column("val").with_column("value_col");
        assert_eq!(field.name, "val");
        assert_eq!(field.column, "value_col");
        let table = Widget::table().with_table_name("widgets");
        assert_eq!(table.table_name(), "widgets");
    }

    #[test]
    fn test_default_apply_fields_from_copies_everything() {
        let mut target = Widget {
            id: Some(1),
            label: "old".to_string(),
        };
        let source = Widget {
            id: Some(1),
            label: "new".to_string(),
        };
        target.apply_fields_from(&source);
        assert_eq!(target, source);
    }

    #[test]
    fn test_key_sequences() {
        assert_eq!(i32::from_sequence(7), Some(7));
        assert_eq!(i32::from_sequence(i64::MAX), None);
        assert_eq!(i64::from_sequence(7), Some(7));
        assert_eq!(String::from_sequence(7), None);
        assert_eq!(Uuid::from_sequence(7), None);
    }

    #[test]
    fn test_int_keys_share_cache_key_space() {
        assert_eq!(12i32.cache_key(), 12i64.cache_key());
        assert_ne!("12".to_string().cache_key(), 12i64.cache_key());
    }

    #[test]
    fn test_entity_kind_names() {
        let kind = Widget::kind();
        assert!(kind.is::<Widget>());
        assert!(!kind.is::<String>());
        assert_eq!(kind.short_name(), "Widget");
        assert_eq!(kind.to_string(), "Widget");
        assert!(kind.type_name().ends_with("Widget"));
        assert_ne!(kind, EntityKind::of::<String>());
    }
}
