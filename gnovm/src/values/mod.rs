//! Runtime values
//!
//! A [`TypedValue`] pairs a static type with a [`Value`]. Variables, struct
//! fields and array elements are [`Slot`]s, shared cells that pointers and
//! closures refer to. Arrays and structs have value semantics: they are
//! deep-copied whenever they are stored into a slot.

mod convert;
mod float_bits;
mod format;
mod literal;
mod ops;

pub use convert::*;
pub use float_bits::*;
pub use format::*;
pub use literal::*;
pub use ops::*;

use crate::ast::{Name, NodeId};
use crate::interp::{Block, Machine, RuntimeError};
use crate::scope::ScopeId;
use crate::types::{Kind, Type, TypeRef, Types};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A shared, mutable storage cell.
pub type Slot = Rc<RefCell<TypedValue>>;

pub fn new_slot(tv: TypedValue) -> Slot {
    Rc::new(RefCell::new(tv))
}

/// Native function body. Receives the evaluated arguments and returns the
/// results in order.
pub type NativeFn = fn(&mut Machine<'_>, Vec<TypedValue>) -> Result<Vec<TypedValue>, RuntimeError>;

#[derive(Debug, Clone, Default)]
pub struct TypedValue {
    /// `None` only for the nil interface value.
    pub ty: Option<TypeRef>,
    pub v: Value,
}

impl TypedValue {
    pub fn new(ty: TypeRef, v: Value) -> Self {
        Self { ty: Some(ty), v }
    }

    pub fn undefined() -> Self {
        Self {
            ty: None,
            v: Value::None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.ty.is_none()
    }

    /// Typed nil (nil pointer, slice, map or func) or the nil interface.
    pub fn is_nil(&self) -> bool {
        matches!(self.v, Value::None)
    }

    pub fn bool(types: &Types, b: bool) -> Self {
        Self::new(types.bool(), Value::Bool(b))
    }

    pub fn int(types: &Types, i: i64) -> Self {
        Self::new(types.int(), Value::Int(i))
    }

    pub fn string(types: &Types, s: &str) -> Self {
        Self::new(types.string(), Value::string(s))
    }

    /// Copy with value semantics: arrays and structs are duplicated.
    pub fn copy(&self) -> Self {
        Self {
            ty: self.ty,
            v: self.v.deep_copy(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.v {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Integer payload, reinterpreting unsigned values.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.v {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => Some(*u as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match &self.v {
            Value::Int(i) => Some(*i as u64),
            Value::Uint(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.v {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value usable as an index or length; negative values and
    /// non-integers yield `None`.
    pub fn as_index(&self) -> Option<usize> {
        match &self.v {
            Value::Int(i) if *i >= 0 => Some(*i as usize),
            Value::Uint(u) => usize::try_from(*u).ok(),
            Value::BigInt(b) => usize::try_from(b.as_ref()).ok(),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    /// All signed integer kinds, sign-extended.
    Int(i64),
    /// All unsigned integer kinds, zero-extended.
    Uint(u64),
    Float32(f32),
    Float64(f64),
    BigInt(Rc<BigInt>),
    BigDec(Rc<BigDecimal>),
    String(Rc<str>),
    Pointer(Pointer),
    Array(Rc<ArrayValue>),
    Slice(SliceValue),
    Struct(Rc<StructValue>),
    Map(Rc<MapValue>),
    Func(Rc<FuncValue>),
    BoundMethod(Rc<BoundMethod>),
    Type(TypeRef),
    Package(Rc<PackageValue>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn bigint(b: BigInt) -> Self {
        Value::BigInt(Rc::new(b))
    }

    pub fn bigdec(d: BigDecimal) -> Self {
        Value::BigDec(Rc::new(d))
    }

    fn deep_copy(&self) -> Value {
        match self {
            Value::Array(av) => Value::Array(Rc::new(av.copy())),
            Value::Struct(sv) => Value::Struct(Rc::new(sv.copy())),
            v => v.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Uint(u) => write!(f, "Uint({u})"),
            Value::Float32(x) => write!(f, "Float32({x})"),
            Value::Float64(x) => write!(f, "Float64({x})"),
            Value::BigInt(b) => write!(f, "BigInt({b})"),
            Value::BigDec(d) => write!(f, "BigDec({d})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Pointer(_) => write!(f, "Pointer"),
            Value::Array(a) => write!(f, "Array(len={})", a.elems.len()),
            Value::Slice(s) => write!(f, "Slice(len={}, cap={})", s.len, s.cap),
            Value::Struct(s) => write!(f, "Struct(fields={})", s.fields.len()),
            Value::Map(m) => write!(f, "Map(len={})", m.len()),
            Value::Func(fv) => write!(f, "Func({})", fv.name),
            Value::BoundMethod(bm) => write!(f, "BoundMethod({})", bm.func.name),
            Value::Type(t) => write!(f, "Type({})", u32::from(t.into_raw())),
            Value::Package(p) => write!(f, "Package({})", p.path),
        }
    }
}

/// Target of a pointer or of an assignment.
#[derive(Clone)]
pub enum Pointer {
    Slot(Slot),
    /// Map element; only used as an assignment target.
    MapEntry {
        map: Rc<MapValue>,
        key: Box<TypedValue>,
        hash: MapKey,
    },
    /// The blank identifier.
    Discard,
}

impl Pointer {
    pub fn same(&self, other: &Pointer) -> bool {
        match (self, other) {
            (Pointer::Slot(a), Pointer::Slot(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct ArrayValue {
    pub elems: Vec<Slot>,
}

impl ArrayValue {
    pub fn new(elems: Vec<TypedValue>) -> Self {
        Self {
            elems: elems.into_iter().map(new_slot).collect(),
        }
    }

    pub fn get(&self, i: usize) -> Option<TypedValue> {
        self.elems.get(i).map(|s| s.borrow().clone())
    }

    fn copy(&self) -> Self {
        Self {
            elems: self
                .elems
                .iter()
                .map(|s| new_slot(s.borrow().copy()))
                .collect(),
        }
    }
}

/// A window onto a shared backing array.
#[derive(Debug, Clone)]
pub struct SliceValue {
    pub base: Rc<ArrayValue>,
    pub offset: usize,
    pub len: usize,
    pub cap: usize,
}

impl SliceValue {
    pub fn from_values(elems: Vec<TypedValue>) -> Self {
        let len = elems.len();
        Self {
            base: Rc::new(ArrayValue::new(elems)),
            offset: 0,
            len,
            cap: len,
        }
    }

    pub fn slot(&self, i: usize) -> Option<&Slot> {
        if i >= self.len {
            return None;
        }
        self.base.elems.get(self.offset + i)
    }

    pub fn get(&self, i: usize) -> Option<TypedValue> {
        self.slot(i).map(|s| s.borrow().clone())
    }

    pub fn values(&self) -> Vec<TypedValue> {
        (0..self.len).filter_map(|i| self.get(i)).collect()
    }
}

#[derive(Debug)]
pub struct StructValue {
    pub fields: Vec<Slot>,
}

impl StructValue {
    pub fn new(fields: Vec<TypedValue>) -> Self {
        Self {
            fields: fields.into_iter().map(new_slot).collect(),
        }
    }

    fn copy(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|s| new_slot(s.borrow().copy()))
                .collect(),
        }
    }
}

/// Hash key of a map entry; derived from the key's type and value.
pub type MapKey = String;

#[derive(Debug)]
struct MapEntry {
    key: TypedValue,
    value: Slot,
}

/// Insertion-ordered hash map.
#[derive(Debug, Default)]
pub struct MapValue {
    entries: RefCell<Vec<Option<MapEntry>>>,
    index: RefCell<HashMap<MapKey, usize>>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, hash: &str) -> Option<TypedValue> {
        let idx = *self.index.borrow().get(hash)?;
        let entries = self.entries.borrow();
        entries[idx].as_ref().map(|e| e.value.borrow().clone())
    }

    pub fn set(&self, hash: MapKey, key: TypedValue, value: TypedValue) {
        if let Some(&idx) = self.index.borrow().get(&hash)
            && let Some(e) = &self.entries.borrow()[idx]
        {
            *e.value.borrow_mut() = value;
            return;
        }
        let mut entries = self.entries.borrow_mut();
        self.index.borrow_mut().insert(hash, entries.len());
        entries.push(Some(MapEntry {
            key,
            value: new_slot(value),
        }));
    }

    pub fn delete(&self, hash: &str) {
        if let Some(idx) = self.index.borrow_mut().remove(hash) {
            self.entries.borrow_mut()[idx] = None;
        }
    }

    /// Live entries in insertion order.
    pub fn entries(&self) -> Vec<(TypedValue, TypedValue)> {
        self.entries
            .borrow()
            .iter()
            .flatten()
            .map(|e| (e.key.clone(), e.value.borrow().clone()))
            .collect()
    }
}

/// Where a function finds its parent block when called.
#[derive(Debug, Clone)]
pub enum Closure {
    /// Top-level function: the block of the file that declares it.
    File { pkg_path: String, file: usize },
    /// Function literal: the block it was evaluated in.
    Block(Rc<Block>),
}

pub struct FuncValue {
    pub ty: TypeRef,
    pub name: Name,
    /// The FuncDecl or FuncLit node; `None` for builtins.
    pub source: Option<NodeId>,
    pub pkg_path: String,
    pub closure: Option<Closure>,
    /// Cells of captured loop variables, in capture order.
    pub captures: Vec<Slot>,
    pub native: Option<NativeFn>,
    pub is_method: bool,
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncValue")
            .field("name", &self.name)
            .field("pkg_path", &self.pkg_path)
            .field("native", &self.native.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct BoundMethod {
    pub func: Rc<FuncValue>,
    pub receiver: TypedValue,
}

/// A loaded package.
#[derive(Debug)]
pub struct PackageValue {
    pub name: Name,
    pub path: String,
    pub node: NodeId,
    pub scope: ScopeId,
    /// Runtime package block, set once the package is initialized.
    pub block: RefCell<Option<Rc<Block>>>,
    pub file_blocks: RefCell<Vec<Rc<Block>>>,
    /// Package-level variable declarations `(file index, decl)` in
    /// initialization order.
    pub init_order: RefCell<Vec<(usize, NodeId)>>,
    pub inits: RefCell<Vec<Rc<FuncValue>>>,
}

impl PackageValue {
    pub fn new(name: impl Into<Name>, path: impl Into<String>, node: NodeId, scope: ScopeId) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            node,
            scope,
            block: RefCell::new(None),
            file_blocks: RefCell::new(Vec::new()),
            init_order: RefCell::new(Vec::new()),
            inits: RefCell::new(Vec::new()),
        }
    }
}

/// Zero value of `t`. Interfaces yield the nil interface.
pub fn zero_value(types: &Types, t: TypeRef) -> TypedValue {
    if types.is_interface(t) {
        return TypedValue::undefined();
    }
    let v = match types.base(t) {
        Type::Primitive(p) => match p.kind() {
            Kind::Bool => Value::Bool(false),
            Kind::String => Value::string(""),
            Kind::Float32 => Value::Float32(0.0),
            Kind::Float64 => Value::Float64(0.0),
            Kind::Bigint => Value::bigint(BigInt::from(0)),
            Kind::Bigdec => Value::bigdec(BigDecimal::from(0)),
            k if k.is_unsigned() => Value::Uint(0),
            k if k.is_integer() => Value::Int(0),
            _ => Value::None,
        },
        Type::Array { len, elt } => {
            let elt = *elt;
            let elems = (0..*len).map(|_| zero_value(types, elt)).collect();
            Value::Array(Rc::new(ArrayValue::new(elems)))
        }
        Type::Struct { fields, .. } => {
            let fields = fields.iter().map(|f| zero_value(types, f.ty)).collect();
            Value::Struct(Rc::new(StructValue::new(fields)))
        }
        _ => Value::None,
    };
    TypedValue::new(t, v)
}

/// Hash key for `tv` used as a map key.
pub fn map_key(types: &Types, tv: &TypedValue) -> Result<MapKey, String> {
    let Some(t) = tv.ty else {
        return Ok("nil".to_string());
    };
    let body = match &tv.v {
        Value::None => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Float32(x) => format!("{:?}", x.to_bits()),
        Value::Float64(x) => format!("{:?}", x.to_bits()),
        Value::BigInt(b) => b.to_string(),
        Value::BigDec(d) => d.normalized().to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Pointer(Pointer::Slot(s)) => format!("{:p}", Rc::as_ptr(s)),
        Value::Array(av) => {
            let parts = av
                .elems
                .iter()
                .map(|s| map_key(types, &s.borrow()))
                .collect::<Result<Vec<_>, _>>()?;
            format!("[{}]", parts.join(","))
        }
        Value::Struct(sv) => {
            let parts = sv
                .fields
                .iter()
                .map(|s| map_key(types, &s.borrow()))
                .collect::<Result<Vec<_>, _>>()?;
            format!("{{{}}}", parts.join(","))
        }
        Value::Type(t) => types.type_id(*t),
        _ => {
            return Err(format!(
                "runtime error: hash of unhashable type {}",
                types.type_string(t)
            ));
        }
    };
    Ok(format!("{}:{body}", types.type_id(t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    // ====================================================================
    // Value semantics
    // ====================================================================

    #[test]
    fn test_struct_copy_is_deep() {
        let mut types = Types::new();
        let int = types.int();
        let st = types.struct_("main", vec![FieldType::new("a", int)]);
        let orig = zero_value(&types, st);
        let copy = orig.copy();
        if let Value::Struct(sv) = &copy.v {
            *sv.fields[0].borrow_mut() = TypedValue::int(&types, 7);
        }
        let Value::Struct(sv) = &orig.v else {
            panic!("expected struct");
        };
        assert_eq!(sv.fields[0].borrow().as_i64(), Some(0));
    }

    #[test]
    fn test_slice_shares_base() {
        let types = Types::new();
        let s = SliceValue::from_values(vec![TypedValue::int(&types, 1), TypedValue::int(&types, 2)]);
        let t = s.clone();
        *t.slot(1).unwrap().borrow_mut() = TypedValue::int(&types, 9);
        assert_eq!(s.get(1).and_then(|v| v.as_i64()), Some(9));
        assert!(s.slot(2).is_none());
    }

    #[test]
    fn test_zero_values() {
        let mut types = Types::new();
        let int = types.int();
        assert_eq!(zero_value(&types, int).as_i64(), Some(0));
        let s = types.slice(int);
        assert!(zero_value(&types, s).is_nil());
        assert!(zero_value(&types, types.error()).is_undefined());
        let arr = types.array(3, int);
        let Value::Array(av) = zero_value(&types, arr).v else {
            panic!("expected array");
        };
        assert_eq!(av.elems.len(), 3);
    }

    // ====================================================================
    // Maps
    // ====================================================================

    #[test]
    fn test_map_insertion_order_and_delete() {
        let types = Types::new();
        let m = MapValue::new();
        for (k, v) in [("b", 1), ("a", 2), ("c", 3)] {
            let key = TypedValue::string(&types, k);
            let hash = map_key(&types, &key).unwrap();
            m.set(hash, key, TypedValue::int(&types, v));
        }
        let a = map_key(&types, &TypedValue::string(&types, "a")).unwrap();
        m.delete(&a);
        let keys: Vec<String> = m
            .entries()
            .iter()
            .map(|(k, _)| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(m.len(), 2);
        assert!(m.get(&a).is_none());
    }

    #[test]
    fn test_map_key_rejects_slices() {
        let mut types = Types::new();
        let int = types.int();
        let st = types.slice(int);
        let key = TypedValue::new(st, Value::Slice(SliceValue::from_values(vec![])));
        let err = map_key(&types, &key).unwrap_err();
        assert!(err.contains("unhashable type []int"));
    }
}
