//! Tether Test Utilities
//!
//! Shared test infrastructure for the Tether workspace:
//! - Entity types covering each key shape (text, generated integer, UUID, none)
//! - Proptest generators for those entities
//! - Tracing setup for tests
//! - Custom assertions for Tether results

pub use tether_core::{
    CacheKey, Entity, EntityKind, FieldDescriptor, Managed, NoKey, StorageError, TableDescriptor,
    TetherError, TetherResult,
};

use uuid::Uuid;

// ============================================================================
// TEST ENTITIES
// ============================================================================

/// Entity with a caller-assigned text key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Foo {
    pub id: String,
    pub val: i32,
}

impl Foo {
    pub fn new(id: impl Into<String>, val: i32) -> Self {
        Self { id: id.into(), val }
    }
}

impl Entity for Foo {
    type Id = String;

    fn table() -> TableDescriptor {
        TableDescriptor::new(
            "Foo",
            vec![FieldDescriptor::id("id"), FieldDescriptor::column("val")],
        )
    }

    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Entity with a store-generated integer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithId {
    pub id: Option<i32>,
    pub stuff: Option<String>,
}

impl WithId {
    /// Unsaved instance; the key is assigned on create.
    pub fn new(stuff: impl Into<String>) -> Self {
        Self {
            id: None,
            stuff: Some(stuff.into()),
        }
    }

    pub fn with_id(id: i32, stuff: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            stuff: Some(stuff.into()),
        }
    }
}

impl Entity for WithId {
    type Id = i32;

    fn table() -> TableDescriptor {
        TableDescriptor::new(
            "WithId",
            vec![
                FieldDescriptor::generated_id("id"),
                FieldDescriptor::column("stuff"),
            ],
        )
        .with_table_name("with_id")
    }

    fn id(&self) -> Option<i32> {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = Some(id);
    }
}

/// Entity without a primary key. Storable, never cacheable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoId {
    pub not_id: i32,
    pub stuff: Option<String>,
}

impl NoId {
    pub fn new(not_id: i32, stuff: impl Into<String>) -> Self {
        Self {
            not_id,
            stuff: Some(stuff.into()),
        }
    }
}

impl Entity for NoId {
    type Id = NoKey;

    fn table() -> TableDescriptor {
        TableDescriptor::new(
            "NoId",
            vec![
                FieldDescriptor::column("not_id").with_column("notId"),
                FieldDescriptor::column("stuff"),
            ],
        )
    }

    fn id(&self) -> Option<NoKey> {
        None
    }

    fn set_id(&mut self, id: NoKey) {
        match id {}
    }
}

/// Entity with a UUID key and a field that is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub owner: String,
    pub balance_cents: i64,
    /// Local-only counter; kept as is when stored values are applied.
    pub local_views: u32,
}

impl Account {
    pub fn new(owner: impl Into<String>, balance_cents: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner: owner.into(),
            balance_cents,
            local_views: 0,
        }
    }
}

impl Entity for Account {
    type Id = Uuid;

    fn table() -> TableDescriptor {
        TableDescriptor::new(
            "Account",
            vec![
                FieldDescriptor::id("id"),
                FieldDescriptor::column("owner"),
                FieldDescriptor::column("balance_cents"),
            ],
        )
        .with_table_name("accounts")
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn apply_fields_from(&mut self, other: &Self) {
        self.id = other.id;
        self.owner.clone_from(&other.owner);
        self.balance_cents = other.balance_cents;
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly fmt subscriber.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for the test entities.

    use super::*;
    use proptest::prelude::*;

    /// Short printable key, never empty.
    pub fn arb_text_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    pub fn arb_foo() -> impl Strategy<Value = Foo> {
        (arb_text_key(), any::<i32>()).prop_map(|(id, val)| Foo { id, val })
    }

    /// Unsaved `WithId`, key unassigned.
    pub fn arb_unsaved_with_id() -> impl Strategy<Value = WithId> {
        proptest::option::of("[ -~]{0,24}").prop_map(|stuff| WithId { id: None, stuff })
    }

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_account() -> impl Strategy<Value = Account> {
        (arb_uuid(), "[A-Za-z ]{1,16}", any::<i64>()).prop_map(|(id, owner, balance_cents)| {
            Account {
                id,
                owner,
                balance_cents,
                local_views: 0,
            }
        })
    }

    /// A list of `Foo` with pairwise distinct keys.
    pub fn arb_distinct_foos(max: usize) -> impl Strategy<Value = Vec<Foo>> {
        proptest::collection::btree_map(arb_text_key(), any::<i32>(), 0..max).prop_map(|rows| {
            rows.into_iter()
                .map(|(id, val)| Foo { id, val })
                .collect()
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Tether results and shared instances.

    use super::*;

    /// Assert that both handles point at the same live instance.
    #[track_caller]
    pub fn assert_same_instance<T: Entity + std::fmt::Debug>(a: &Managed<T>, b: &Managed<T>) {
        assert!(
            a.same_instance(b),
            "Expected one shared instance, got {:?} and {:?}",
            a,
            b
        );
    }

    /// Assert that the handles point at different instances.
    #[track_caller]
    pub fn assert_distinct_instances<T: Entity + std::fmt::Debug>(
        a: &Managed<T>,
        b: &Managed<T>,
    ) {
        assert!(!a.same_instance(b), "Expected distinct instances, got {:?}", a);
    }

    /// Assert that a TetherResult failed with an invalid-argument error.
    #[track_caller]
    pub fn assert_invalid_argument<T: std::fmt::Debug>(result: &TetherResult<T>) {
        match result {
            Err(e) if e.is_invalid_argument() => {}
            other => panic!("Expected invalid-argument error, got: {:?}", other),
        }
    }

    /// Assert that a TetherResult failed with a storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &TetherResult<T>) {
        match result {
            Err(TetherError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a TetherResult failed because the entity has no primary key.
    #[track_caller]
    pub fn assert_no_primary_key<T: std::fmt::Debug>(result: &TetherResult<T>) {
        match result {
            Err(TetherError::Storage(StorageError::NoPrimaryKey { .. })) => {}
            other => panic!("Expected NoPrimaryKey error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_tables() {
        assert!(!Foo::table().id_field().unwrap().generated_id);
        assert!(WithId::table().id_field().unwrap().generated_id);
        assert_eq!(WithId::table().table_name(), "with_id");
        assert!(!NoId::table().has_id());
        assert_eq!(Account::table().table_name(), "accounts");
    }

    #[test]
    fn test_account_apply_keeps_local_fields() {
        let mut local = Account::new("ann", 100);
        local.local_views = 7;
        let mut stored = local.clone();
        stored.balance_cents = 250;
        stored.local_views = 0;

        local.apply_fields_from(&stored);
        assert_eq!(local.balance_cents, 250);
        assert_eq!(local.local_views, 7);
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
