//! Type representation
//!
//! Types live in the [`Types`] arena and are interned by their TypeID
//! string, so structurally identical types share one [`TypeRef`]. Declared
//! types are created once per package path and name, collect methods while
//! unsealed, and are sealed exactly once.

mod check;

pub use check::*;

use crate::ast::{ChanDir, Name};
use crate::values::FuncValue;
use la_arena::{Arena, Idx};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type TypeRef = Idx<Type>;

/// Kind of a type, shared by a declared type and its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Invalid,
    Bool,
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bigint,
    Bigdec,
    Array,
    Slice,
    Pointer,
    Struct,
    Package,
    Interface,
    Chan,
    Func,
    Map,
    Type,
    Tuple,
    Native,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}Kind")
    }
}

impl Kind {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Kind::Int
                | Kind::Int8
                | Kind::Int16
                | Kind::Int32
                | Kind::Int64
                | Kind::Uint
                | Kind::Uint8
                | Kind::Uint16
                | Kind::Uint32
                | Kind::Uint64
                | Kind::Bigint
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Kind::Uint | Kind::Uint8 | Kind::Uint16 | Kind::Uint32 | Kind::Uint64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Kind::Float32 | Kind::Float64 | Kind::Bigdec)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Kinds whose values can be compared with `==`.
    pub fn is_comparable(self) -> bool {
        !matches!(self, Kind::Slice | Kind::Map | Kind::Func)
    }

    /// Kinds whose values can be ordered with `<`.
    pub fn is_ordered(self) -> bool {
        self.is_numeric() || self == Kind::String
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bigint,
    Bigdec,
    UntypedBool,
    UntypedRune,
    UntypedBigint,
    UntypedBigdec,
    UntypedString,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 21] = [
        PrimitiveType::Bool,
        PrimitiveType::String,
        PrimitiveType::Int,
        PrimitiveType::Int8,
        PrimitiveType::Int16,
        PrimitiveType::Int32,
        PrimitiveType::Int64,
        PrimitiveType::Uint,
        PrimitiveType::Uint8,
        PrimitiveType::Uint16,
        PrimitiveType::Uint32,
        PrimitiveType::Uint64,
        PrimitiveType::Float32,
        PrimitiveType::Float64,
        PrimitiveType::Bigint,
        PrimitiveType::Bigdec,
        PrimitiveType::UntypedBool,
        PrimitiveType::UntypedRune,
        PrimitiveType::UntypedBigint,
        PrimitiveType::UntypedBigdec,
        PrimitiveType::UntypedString,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::String => "string",
            PrimitiveType::Int => "int",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Uint => "uint",
            PrimitiveType::Uint8 => "uint8",
            PrimitiveType::Uint16 => "uint16",
            PrimitiveType::Uint32 => "uint32",
            PrimitiveType::Uint64 => "uint64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::Bigint => "bigint",
            PrimitiveType::Bigdec => "bigdec",
            PrimitiveType::UntypedBool => "<untyped> bool",
            PrimitiveType::UntypedRune => "<untyped> int32",
            PrimitiveType::UntypedBigint => "<untyped> bigint",
            PrimitiveType::UntypedBigdec => "<untyped> bigdec",
            PrimitiveType::UntypedString => "<untyped> string",
        }
    }

    pub fn kind(self) -> Kind {
        match self {
            PrimitiveType::Bool | PrimitiveType::UntypedBool => Kind::Bool,
            PrimitiveType::String | PrimitiveType::UntypedString => Kind::String,
            PrimitiveType::Int => Kind::Int,
            PrimitiveType::Int8 => Kind::Int8,
            PrimitiveType::Int16 => Kind::Int16,
            PrimitiveType::Int32 | PrimitiveType::UntypedRune => Kind::Int32,
            PrimitiveType::Int64 => Kind::Int64,
            PrimitiveType::Uint => Kind::Uint,
            PrimitiveType::Uint8 => Kind::Uint8,
            PrimitiveType::Uint16 => Kind::Uint16,
            PrimitiveType::Uint32 => Kind::Uint32,
            PrimitiveType::Uint64 => Kind::Uint64,
            PrimitiveType::Float32 => Kind::Float32,
            PrimitiveType::Float64 => Kind::Float64,
            PrimitiveType::Bigint | PrimitiveType::UntypedBigint => Kind::Bigint,
            PrimitiveType::Bigdec | PrimitiveType::UntypedBigdec => Kind::Bigdec,
        }
    }

    pub fn is_untyped(self) -> bool {
        matches!(
            self,
            PrimitiveType::UntypedBool
                | PrimitiveType::UntypedRune
                | PrimitiveType::UntypedBigint
                | PrimitiveType::UntypedBigdec
                | PrimitiveType::UntypedString
        )
    }

    /// The type an untyped constant takes when nothing else decides.
    pub fn default_type(self) -> PrimitiveType {
        match self {
            PrimitiveType::UntypedBool => PrimitiveType::Bool,
            PrimitiveType::UntypedRune => PrimitiveType::Int32,
            PrimitiveType::UntypedBigint => PrimitiveType::Int,
            PrimitiveType::UntypedBigdec => PrimitiveType::Float64,
            PrimitiveType::UntypedString => PrimitiveType::String,
            p => p,
        }
    }
}

/// A struct field, or a method of an interface.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    pub name: Name,
    pub ty: TypeRef,
    pub embedded: bool,
    pub tag: Option<String>,
}

impl FieldType {
    pub fn new(name: impl Into<Name>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: false,
            tag: None,
        }
    }
}

/// A method of a declared type. `ty` excludes the receiver.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: Name,
    pub ty: TypeRef,
    pub ptr_receiver: bool,
    pub func: Option<Rc<FuncValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
    Unsealed,
    Sealed,
}

#[derive(Debug, Clone)]
pub struct DeclaredType {
    pub pkg_path: String,
    pub name: Name,
    /// `None` until the right-hand side has been resolved.
    pub base: Option<TypeRef>,
    pub methods: Vec<Method>,
    pub state: SealState,
    /// Disambiguates types declared inside function bodies.
    pub local: Option<String>,
}

impl DeclaredType {
    pub fn is_sealed(&self) -> bool {
        self.state == SealState::Sealed
    }

    pub fn find_method(&self, name: &str) -> Option<(usize, &Method)> {
        self.methods.iter().enumerate().find(|(_, m)| m.name == name)
    }
}

/// Closed set of type variants.
#[derive(Debug, Clone)]
pub enum Type {
    Primitive(PrimitiveType),
    Pointer(TypeRef),
    Array { len: usize, elt: TypeRef },
    Slice(TypeRef),
    Map { key: TypeRef, value: TypeRef },
    Struct { pkg_path: String, fields: Vec<FieldType> },
    Interface { pkg_path: String, methods: Vec<FieldType> },
    Func {
        params: Vec<TypeRef>,
        results: Vec<TypeRef>,
        variadic: bool,
    },
    Declared(DeclaredType),
    Chan { dir: ChanDir, elt: TypeRef },
    Native { name: String },
    Tuple(Vec<TypeRef>),
    Package,
    TypeType,
    /// A function type whose signature is not resolved yet.
    Placeholder,
}

/// The type arena.
#[derive(Debug)]
pub struct Types {
    arena: Arena<Type>,
    interned: HashMap<String, TypeRef>,
    prims: Vec<TypeRef>,
    error: TypeRef,
    empty_interface: TypeRef,
    type_type: TypeRef,
    package: TypeRef,
    /// Non-zero while a preprocessor run is active; constant-only
    /// conversions are refused otherwise.
    pub preprocessing: u32,
}

impl Default for Types {
    fn default() -> Self {
        Self::new()
    }
}

impl Types {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let mut interned = HashMap::new();
        let mut prims = Vec::with_capacity(PrimitiveType::ALL.len());
        for p in PrimitiveType::ALL {
            let t = arena.alloc(Type::Primitive(p));
            interned.insert(p.name().to_string(), t);
            prims.push(t);
        }
        let type_type = arena.alloc(Type::TypeType);
        interned.insert("type".to_string(), type_type);
        let package = arena.alloc(Type::Package);
        interned.insert("package".to_string(), package);
        let empty_interface = arena.alloc(Type::Interface {
            pkg_path: String::new(),
            methods: vec![],
        });
        interned.insert("interface{}".to_string(), empty_interface);
        let string = prims[PrimitiveType::String as usize];
        let error_sig = arena.alloc(Type::Func {
            params: vec![],
            results: vec![string],
            variadic: false,
        });
        interned.insert("func() string".to_string(), error_sig);
        let error_iface = arena.alloc(Type::Interface {
            pkg_path: String::new(),
            methods: vec![FieldType::new("Error", error_sig)],
        });
        interned.insert("interface{Error func() string}".to_string(), error_iface);
        let error = arena.alloc(Type::Declared(DeclaredType {
            pkg_path: String::new(),
            name: "error".to_string(),
            base: Some(error_iface),
            methods: vec![],
            state: SealState::Sealed,
            local: None,
        }));
        interned.insert("error".to_string(), error);
        Self {
            arena,
            interned,
            prims,
            error,
            empty_interface,
            type_type,
            package,
            preprocessing: 0,
        }
    }

    pub fn get(&self, t: TypeRef) -> &Type {
        &self.arena[t]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn is_preprocessing(&self) -> bool {
        self.preprocessing > 0
    }

    // ---- well-known types ----

    pub fn prim(&self, p: PrimitiveType) -> TypeRef {
        self.prims[p as usize]
    }

    pub fn bool(&self) -> TypeRef {
        self.prim(PrimitiveType::Bool)
    }

    pub fn string(&self) -> TypeRef {
        self.prim(PrimitiveType::String)
    }

    pub fn int(&self) -> TypeRef {
        self.prim(PrimitiveType::Int)
    }

    pub fn int32(&self) -> TypeRef {
        self.prim(PrimitiveType::Int32)
    }

    pub fn uint8(&self) -> TypeRef {
        self.prim(PrimitiveType::Uint8)
    }

    pub fn float64(&self) -> TypeRef {
        self.prim(PrimitiveType::Float64)
    }

    pub fn untyped_bool(&self) -> TypeRef {
        self.prim(PrimitiveType::UntypedBool)
    }

    pub fn error(&self) -> TypeRef {
        self.error
    }

    pub fn empty_interface(&self) -> TypeRef {
        self.empty_interface
    }

    pub fn type_type(&self) -> TypeRef {
        self.type_type
    }

    pub fn package(&self) -> TypeRef {
        self.package
    }

    // ---- construction ----

    /// Returns the arena entry for `ty`, allocating it if no type with the
    /// same TypeID exists yet.
    pub fn intern(&mut self, ty: Type) -> TypeRef {
        let id = self.id_of(&ty, true);
        if let Some(t) = self.interned.get(&id) {
            return *t;
        }
        let t = self.arena.alloc(ty);
        self.interned.insert(id, t);
        t
    }

    pub fn pointer(&mut self, elt: TypeRef) -> TypeRef {
        self.intern(Type::Pointer(elt))
    }

    pub fn array(&mut self, len: usize, elt: TypeRef) -> TypeRef {
        self.intern(Type::Array { len, elt })
    }

    pub fn slice(&mut self, elt: TypeRef) -> TypeRef {
        self.intern(Type::Slice(elt))
    }

    pub fn map(&mut self, key: TypeRef, value: TypeRef) -> TypeRef {
        self.intern(Type::Map { key, value })
    }

    pub fn chan(&mut self, dir: ChanDir, elt: TypeRef) -> TypeRef {
        self.intern(Type::Chan { dir, elt })
    }

    pub fn func(&mut self, params: Vec<TypeRef>, results: Vec<TypeRef>, variadic: bool) -> TypeRef {
        self.intern(Type::Func {
            params,
            results,
            variadic,
        })
    }

    pub fn tuple(&mut self, elts: Vec<TypeRef>) -> TypeRef {
        self.intern(Type::Tuple(elts))
    }

    pub fn native(&mut self, name: impl Into<String>) -> TypeRef {
        self.intern(Type::Native { name: name.into() })
    }

    pub fn struct_(&mut self, pkg_path: &str, fields: Vec<FieldType>) -> TypeRef {
        self.intern(Type::Struct {
            pkg_path: pkg_path.to_string(),
            fields,
        })
    }

    /// Interface with methods sorted by name.
    pub fn interface(&mut self, pkg_path: &str, mut methods: Vec<FieldType>) -> TypeRef {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        methods.dedup_by(|a, b| a.name == b.name);
        self.intern(Type::Interface {
            pkg_path: pkg_path.to_string(),
            methods,
        })
    }

    /// Declares a named type. Declaring the same name in the same package
    /// (and location, for local types) returns the existing type.
    pub fn declare(&mut self, pkg_path: &str, name: &str, local: Option<String>) -> TypeRef {
        let dt = DeclaredType {
            pkg_path: pkg_path.to_string(),
            name: name.to_string(),
            base: None,
            methods: vec![],
            state: SealState::Unsealed,
            local,
        };
        let id = declared_id(&dt);
        if let Some(t) = self.interned.get(&id) {
            return *t;
        }
        let t = self.arena.alloc(Type::Declared(dt));
        self.interned.insert(id, t);
        t
    }

    pub fn declared(&self, t: TypeRef) -> Option<&DeclaredType> {
        match &self.arena[t] {
            Type::Declared(dt) => Some(dt),
            _ => None,
        }
    }

    fn declared_mut(&mut self, t: TypeRef) -> Result<&mut DeclaredType, String> {
        match &mut self.arena[t] {
            Type::Declared(dt) => Ok(dt),
            _ => Err("not a declared type".to_string()),
        }
    }

    pub fn set_base(&mut self, t: TypeRef, base: TypeRef) -> Result<(), String> {
        let base = self.base_of(base);
        let dt = self.declared_mut(t)?;
        if dt.is_sealed() {
            return Err(format!("cannot change base of sealed type {}", dt.name));
        }
        dt.base = Some(base);
        Ok(())
    }

    pub fn add_method(&mut self, t: TypeRef, method: Method) -> Result<(), String> {
        let dt = self.declared_mut(t)?;
        if dt.is_sealed() {
            return Err(format!(
                "cannot add method {} to sealed type {}",
                method.name, dt.name
            ));
        }
        if let Some((i, _)) = dt.find_method(&method.name) {
            dt.methods[i] = method;
        } else {
            dt.methods.push(method);
        }
        Ok(())
    }

    /// Attaches the function value of an already declared method.
    pub fn set_method_func(&mut self, t: TypeRef, name: &str, func: Rc<FuncValue>) -> Result<(), String> {
        let dt = self.declared_mut(t)?;
        match dt.methods.iter_mut().find(|m| m.name == name) {
            Some(m) => {
                m.func = Some(func);
                Ok(())
            }
            None => Err(format!("type {} has no method {name}", dt.name)),
        }
    }

    /// Seals a declared type. Sealing twice is an error.
    pub fn seal(&mut self, t: TypeRef) -> Result<(), String> {
        let dt = self.declared_mut(t)?;
        if dt.is_sealed() {
            return Err(format!("type {} already sealed", dt.name));
        }
        if dt.base.is_none() {
            return Err(format!("type {} has no base type", dt.name));
        }
        dt.state = SealState::Sealed;
        Ok(())
    }

    pub fn is_sealed(&self, t: TypeRef) -> bool {
        self.declared(t).is_none_or(|dt| dt.is_sealed())
    }

    pub fn new_placeholder(&mut self) -> TypeRef {
        self.arena.alloc(Type::Placeholder)
    }

    pub fn is_placeholder(&self, t: TypeRef) -> bool {
        matches!(self.arena[t], Type::Placeholder)
    }

    /// Fills a placeholder with the resolved function type.
    pub fn fill_placeholder(&mut self, ph: TypeRef, real: TypeRef) -> Result<(), String> {
        if !self.is_placeholder(ph) {
            return Err("type is not a placeholder".to_string());
        }
        let real = self.arena[real].clone();
        if !matches!(real, Type::Func { .. }) {
            return Err("placeholder can only hold a function type".to_string());
        }
        self.arena[ph] = real;
        Ok(())
    }

    pub fn reset_placeholder(&mut self, ph: TypeRef) {
        self.arena[ph] = Type::Placeholder;
    }

    // ---- queries ----

    pub fn type_id(&self, t: TypeRef) -> String {
        self.ref_id(t, true)
    }

    /// Human-readable name; like the TypeID without location suffixes.
    pub fn type_string(&self, t: TypeRef) -> String {
        self.ref_id(t, false)
    }

    /// Finds an already interned type by its TypeID.
    pub fn lookup(&self, id: &str) -> Option<TypeRef> {
        self.interned.get(id).copied()
    }

    fn ref_id(&self, t: TypeRef, full: bool) -> String {
        match &self.arena[t] {
            Type::Placeholder => format!("placeholder#{}", u32::from(t.into_raw())),
            ty => self.id_of(ty, full),
        }
    }

    fn id_of(&self, ty: &Type, full: bool) -> String {
        let list = |ts: &[TypeRef]| -> String {
            ts.iter()
                .map(|t| self.ref_id(*t, full))
                .collect::<Vec<_>>()
                .join(",")
        };
        match ty {
            Type::Primitive(p) => p.name().to_string(),
            Type::Pointer(e) => format!("*{}", self.ref_id(*e, full)),
            Type::Array { len, elt } => format!("[{len}]{}", self.ref_id(*elt, full)),
            Type::Slice(e) => format!("[]{}", self.ref_id(*e, full)),
            Type::Map { key, value } => {
                format!("map[{}]{}", self.ref_id(*key, full), self.ref_id(*value, full))
            }
            Type::Struct { fields, .. } => {
                let fs: Vec<String> = fields
                    .iter()
                    .map(|f| {
                        if f.embedded {
                            self.ref_id(f.ty, full)
                        } else {
                            format!("{} {}", f.name, self.ref_id(f.ty, full))
                        }
                    })
                    .collect();
                format!("struct{{{}}}", fs.join(";"))
            }
            Type::Interface { methods, .. } => {
                let ms: Vec<String> = methods
                    .iter()
                    .map(|m| format!("{} {}", m.name, self.ref_id(m.ty, full)))
                    .collect();
                format!("interface{{{}}}", ms.join(";"))
            }
            Type::Func {
                params,
                results,
                variadic,
            } => {
                let mut ps: Vec<String> = params.iter().map(|p| self.ref_id(*p, full)).collect();
                if *variadic
                    && let Some(last) = params.last()
                    && let Type::Slice(e) = &self.arena[*last]
                {
                    let n = ps.len() - 1;
                    ps[n] = format!("...{}", self.ref_id(*e, full));
                }
                match results.len() {
                    0 => format!("func({})", ps.join(",")),
                    1 => format!("func({}) {}", ps.join(","), self.ref_id(results[0], full)),
                    _ => format!("func({}) ({})", ps.join(","), list(results)),
                }
            }
            Type::Declared(dt) => {
                if full {
                    declared_id(dt)
                } else if dt.pkg_path.is_empty() {
                    dt.name.clone()
                } else {
                    format!("{}.{}", dt.pkg_path, dt.name)
                }
            }
            Type::Chan { dir, elt } => {
                let prefix = match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                };
                format!("{prefix}{}", self.ref_id(*elt, full))
            }
            Type::Native { name } => format!("native:{name}"),
            Type::Tuple(ts) => format!("({})", list(ts)),
            Type::Package => "package".to_string(),
            Type::TypeType => "type".to_string(),
            Type::Placeholder => "placeholder".to_string(),
        }
    }

    /// Type identity.
    pub fn same(&self, a: TypeRef, b: TypeRef) -> bool {
        a == b || self.type_id(a) == self.type_id(b)
    }

    /// Strips declared types down to their underlying type.
    pub fn base_of(&self, t: TypeRef) -> TypeRef {
        let mut cur = t;
        for _ in 0..64 {
            match &self.arena[cur] {
                Type::Declared(DeclaredType { base: Some(b), .. }) => cur = *b,
                _ => return cur,
            }
        }
        cur
    }

    pub fn base(&self, t: TypeRef) -> &Type {
        &self.arena[self.base_of(t)]
    }

    pub fn kind(&self, t: TypeRef) -> Kind {
        match self.base(t) {
            Type::Primitive(p) => p.kind(),
            Type::Pointer(_) => Kind::Pointer,
            Type::Array { .. } => Kind::Array,
            Type::Slice(_) => Kind::Slice,
            Type::Map { .. } => Kind::Map,
            Type::Struct { .. } => Kind::Struct,
            Type::Interface { .. } => Kind::Interface,
            Type::Func { .. } | Type::Placeholder => Kind::Func,
            Type::Declared(_) => Kind::Invalid,
            Type::Chan { .. } => Kind::Chan,
            Type::Native { .. } => Kind::Native,
            Type::Tuple(_) => Kind::Tuple,
            Type::Package => Kind::Package,
            Type::TypeType => Kind::Type,
        }
    }

    pub fn primitive(&self, t: TypeRef) -> Option<PrimitiveType> {
        match &self.arena[t] {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_untyped(&self, t: TypeRef) -> bool {
        self.primitive(t).is_some_and(|p| p.is_untyped())
    }

    /// Default type of an untyped constant type, or `t` itself.
    pub fn default_type(&self, t: TypeRef) -> TypeRef {
        match self.primitive(t) {
            Some(p) if p.is_untyped() => self.prim(p.default_type()),
            _ => t,
        }
    }

    pub fn is_interface(&self, t: TypeRef) -> bool {
        matches!(self.base(t), Type::Interface { .. })
    }

    pub fn is_declared(&self, t: TypeRef) -> bool {
        matches!(self.arena[t], Type::Declared(_))
    }

    /// Element type of pointers, arrays, slices, maps, channels and
    /// strings (`uint8`).
    pub fn elem(&self, t: TypeRef) -> Option<TypeRef> {
        match self.base(t) {
            Type::Pointer(e) | Type::Slice(e) => Some(*e),
            Type::Array { elt, .. } | Type::Chan { elt, .. } => Some(*elt),
            Type::Map { value, .. } => Some(*value),
            Type::Primitive(p) if p.kind() == Kind::String => Some(self.uint8()),
            _ => None,
        }
    }

    pub fn map_key(&self, t: TypeRef) -> Option<TypeRef> {
        match self.base(t) {
            Type::Map { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn array_len(&self, t: TypeRef) -> Option<usize> {
        match self.base(t) {
            Type::Array { len, .. } => Some(*len),
            _ => None,
        }
    }

    pub fn struct_fields(&self, t: TypeRef) -> Option<&[FieldType]> {
        match self.base(t) {
            Type::Struct { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn interface_methods(&self, t: TypeRef) -> Option<&[FieldType]> {
        match self.base(t) {
            Type::Interface { methods, .. } => Some(methods),
            _ => None,
        }
    }

    /// Parameters, results and variadic flag of a function type.
    pub fn signature(&self, t: TypeRef) -> Option<(&[TypeRef], &[TypeRef], bool)> {
        match self.base(t) {
            Type::Func {
                params,
                results,
                variadic,
            } => Some((params, results, *variadic)),
            _ => None,
        }
    }

    pub fn tuple_elts(&self, t: TypeRef) -> Option<&[TypeRef]> {
        match &self.arena[t] {
            Type::Tuple(ts) => Some(ts),
            _ => None,
        }
    }

    /// The declared type owning the methods of `t` or of `*t`.
    pub fn method_owner(&self, t: TypeRef) -> Option<&DeclaredType> {
        match &self.arena[t] {
            Type::Declared(dt) => Some(dt),
            Type::Pointer(e) => self.declared(*e),
            _ => None,
        }
    }
}

fn declared_id(dt: &DeclaredType) -> String {
    let base = if dt.pkg_path.is_empty() {
        dt.name.clone()
    } else {
        format!("{}.{}", dt.pkg_path, dt.name)
    };
    match &dt.local {
        Some(loc) => format!("{base}·{loc}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_shares_refs() {
        let mut types = Types::new();
        let int = types.int();
        let a = types.slice(int);
        let b = types.slice(int);
        assert_eq!(a, b);
        assert_eq!(types.type_id(a), "[]int");
        let m = types.map(types.string(), a);
        assert_eq!(types.type_id(m), "map[string][]int");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(Kind::Int8.to_string(), "Int8Kind");
        assert_eq!(PrimitiveType::UntypedRune.kind().to_string(), "Int32Kind");
        assert_eq!(PrimitiveType::UntypedBigint.kind().to_string(), "BigintKind");
    }

    #[test]
    fn test_declared_type_once_per_name() {
        let mut types = Types::new();
        let a = types.declare("main", "T", None);
        let b = types.declare("main", "T", None);
        let c = types.declare("other", "T", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!types.same(a, c));
    }

    #[test]
    fn test_seal_once() {
        let mut types = Types::new();
        let t = types.declare("main", "T", None);
        assert!(types.seal(t).is_err());
        types.set_base(t, types.int()).unwrap();
        assert_eq!(types.kind(t), Kind::Int);
        types.seal(t).unwrap();
        assert!(types.seal(t).is_err());
        let sig = types.func(vec![], vec![], false);
        let err = types
            .add_method(
                t,
                Method {
                    name: "M".into(),
                    ty: sig,
                    ptr_receiver: false,
                    func: None,
                },
            )
            .unwrap_err();
        assert!(err.contains("sealed"));
    }

    #[test]
    fn test_variadic_func_id() {
        let mut types = Types::new();
        let int = types.int();
        let ints = types.slice(int);
        let f = types.func(vec![types.string(), ints], vec![int], true);
        assert_eq!(types.type_id(f), "func(string,...int) int");
        let g = types.func(vec![types.string(), ints], vec![int], false);
        assert!(!types.same(f, g));
    }

    #[test]
    fn test_local_type_id_is_qualified() {
        let mut types = Types::new();
        let t = types.declare("main", "T", Some("main.gno:4:2".into()));
        assert_eq!(types.type_id(t), "main.T·main.gno:4:2");
        assert_eq!(types.type_string(t), "main.T");
    }

    #[test]
    fn test_error_is_declared_interface() {
        let types = Types::new();
        let e = types.error();
        assert!(types.is_declared(e));
        assert!(types.is_interface(e));
        assert_eq!(types.interface_methods(e).map(|m| m.len()), Some(1));
    }
}
