//! Engine type identifiers and the type registry.
//!
//! Every value type the engine can talk about is identified by a small
//! non-zero integer. Six ids are pre-assigned; host-registered types
//! receive fresh ids starting at [`TypeId::FIRST_USER`]. All integer
//! widths and `char` collapse onto [`TypeId::INT`], `f32` and `f64`
//! collapse onto [`TypeId::DOUBLE`] (see the `Element` impls in
//! `verdict_expr`).

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{FormulaError, FormulaResult};

/// Stable small-integer identifier for a value type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Sentinel: "no type". Also the wildcard slot in operator keys.
    pub const VOID: TypeId = TypeId(0);
    pub const STRING: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const DOUBLE: TypeId = TypeId(3);
    pub const BOOL: TypeId = TypeId(4);
    /// Reserved for fact-resolver bookkeeping.
    pub const FACT: TypeId = TypeId(5);

    /// First id handed out to host-registered types.
    pub const FIRST_USER: u32 = 16;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is one of the six pre-assigned ids.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER
    }

    #[inline]
    pub const fn is_void(self) -> bool {
        self.0 == 0
    }

    /// Canonical name for the pre-assigned ids; registry-free contexts
    /// fall back to this when labelling errors.
    pub const fn builtin_name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("void"),
            1 => Some("string"),
            2 => Some("int"),
            3 => Some("double"),
            4 => Some("bool"),
            5 => Some("fact"),
            _ => None,
        }
    }

    /// Best-effort label without a registry at hand.
    pub fn label(self) -> String {
        match self.builtin_name() {
            Some(name) => name.to_string(),
            None => format!("type#{}", self.0),
        }
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TypeId::VOID => write!(f, "TypeId(void)"),
            TypeId::STRING => write!(f, "TypeId(string)"),
            TypeId::INT => write!(f, "TypeId(int)"),
            TypeId::DOUBLE => write!(f, "TypeId(double)"),
            TypeId::BOOL => write!(f, "TypeId(bool)"),
            TypeId::FACT => write!(f, "TypeId(fact)"),
            TypeId(raw) => write!(f, "TypeId({raw})"),
        }
    }
}

/// Canonical names of the built-in types, indexed by raw id.
const BUILTIN_NAMES: [&str; 6] = ["void", "string", "int", "double", "bool", "fact"];

/// Registry mapping canonical names and Rust types to [`TypeId`]s.
///
/// Registration is idempotent: registering an already-known name (or
/// Rust type) returns the existing id. Ids are never reused.
pub struct TypeRegistry {
    by_name: FxHashMap<Rc<str>, TypeId>,
    by_rust: FxHashMap<std::any::TypeId, TypeId>,
    /// Canonical name per registered id, indexed by `raw - FIRST_USER`.
    user_names: Vec<Rc<str>>,
    next: u32,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut by_name = FxHashMap::default();
        for (raw, name) in BUILTIN_NAMES.iter().enumerate() {
            by_name.insert(Rc::from(*name), TypeId(raw as u32));
        }
        TypeRegistry {
            by_name,
            by_rust: FxHashMap::default(),
            user_names: Vec::new(),
            next: TypeId::FIRST_USER,
        }
    }

    /// Register (or look up) a type by canonical name.
    pub fn register(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TypeId(self.next);
        self.next += 1;
        let name: Rc<str> = Rc::from(name);
        self.user_names.push(name.clone());
        self.by_name.insert(name, id);
        id
    }

    /// Register (or look up) a host Rust type under a canonical name.
    ///
    /// The same Rust type registered twice keeps its first id, even if
    /// the second call supplies a different name.
    pub fn register_rust<T: Any>(&mut self, name: &str) -> TypeId {
        let rust = std::any::TypeId::of::<T>();
        if let Some(&id) = self.by_rust.get(&rust) {
            return id;
        }
        let id = self.register(name);
        self.by_rust.insert(rust, id);
        id
    }

    /// Look up a type by canonical name.
    pub fn find_name(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Look up the engine id of a host Rust type.
    pub fn find_rust<T: Any>(&self) -> Option<TypeId> {
        self.by_rust.get(&std::any::TypeId::of::<T>()).copied()
    }

    /// Like [`find_rust`](Self::find_rust) but failing with
    /// [`FormulaError::UnregisteredType`] naming the Rust type.
    pub fn expect_rust<T: Any>(&self) -> FormulaResult<TypeId> {
        self.find_rust::<T>().ok_or_else(|| {
            FormulaError::UnregisteredType(std::any::type_name::<T>().to_string())
        })
    }

    /// Canonical name for a registered id.
    pub fn name_of(&self, id: TypeId) -> &str {
        self.lookup_name(id).unwrap_or("<unregistered>")
    }

    /// Canonical name, if this registry knows the id.
    pub fn lookup_name(&self, id: TypeId) -> Option<&str> {
        let raw = id.raw();
        if (raw as usize) < BUILTIN_NAMES.len() {
            return Some(BUILTIN_NAMES[raw as usize]);
        }
        self.user_names
            .get(raw.checked_sub(TypeId::FIRST_USER)? as usize)
            .map(|n| &**n)
    }

    /// Value types this registry knows: the four primitive value types
    /// plus every user registration, in id order.
    pub fn iter_value_types(&self) -> impl Iterator<Item = (TypeId, &str)> {
        [TypeId::STRING, TypeId::INT, TypeId::DOUBLE, TypeId::BOOL]
            .into_iter()
            .map(|id| {
                let name = BUILTIN_NAMES[id.raw() as usize];
                (id, name)
            })
            .chain(self.user_names.iter().enumerate().map(|(i, name)| {
                (TypeId::from_raw(TypeId::FIRST_USER + i as u32), &**name)
            }))
    }
}
