//! Static scopes and lexical addressing
//!
//! Every block node owns a [`StaticBlock`] in the [`Scopes`] arena. Names
//! are resolved to [`ValuePath`]s relative to the block a reference appears
//! in; the runtime walks the same number of parent blocks to find the slot.

use crate::ast::{Capture, Location, Name, NodeId};
use crate::types::{TypeRef, Types};
use crate::values::TypedValue;
use la_arena::{Arena, Idx};
use std::collections::HashMap;
use std::fmt;

pub type ScopeId = Idx<StaticBlock>;

/// Maximum block depth a path can address.
pub const MAX_DEPTH: u8 = 127;

/// Kind of lexical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Block,
    Uverse,
    Field,
    DerefField,
    InterfaceMethod,
    ValueMethod,
    PtrMethod,
    DerefValueMethod,
    Native,
}

/// A lexical address: the number of blocks to walk up and the slot there,
/// or a field/method selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValuePath {
    pub kind: PathKind,
    pub depth: u8,
    pub index: u16,
    pub name: Name,
}

impl ValuePath {
    pub fn block(depth: u8, index: u16, name: impl Into<Name>) -> Self {
        Self {
            kind: PathKind::Block,
            depth,
            index,
            name: name.into(),
        }
    }

    pub fn uverse(index: u16, name: impl Into<Name>) -> Self {
        Self {
            kind: PathKind::Uverse,
            depth: 0,
            index,
            name: name.into(),
        }
    }

    pub fn selector(kind: PathKind, index: u16, name: impl Into<Name>) -> Self {
        Self {
            kind,
            depth: 0,
            index,
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.depth > MAX_DEPTH {
            return Err(format!(
                "value path depth {} of {} exceeds {MAX_DEPTH}",
                self.depth, self.name
            ));
        }
        match self.kind {
            PathKind::Block => {
                if self.depth == 0 && self.name != "_" {
                    return Err(format!("block path of {} has depth 0", self.name));
                }
            }
            _ => {
                if self.depth != 0 {
                    return Err(format!(
                        "{:?} path of {} must have depth 0, got {}",
                        self.kind, self.name, self.depth
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}[{}:{}]({})",
            self.kind, self.depth, self.index, self.name
        )
    }
}

/// How a name entered its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameSource {
    Define,
    Import,
    Var,
    Const,
    Type,
    Func,
    RangeKey,
    RangeValue,
    Receiver,
    Param,
    Result,
    TypeSwitch,
    Capture,
    Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Uverse,
    Package,
    File,
    FuncDecl,
    FuncLit,
    Block,
    If,
    IfCase,
    For,
    Range,
    Switch,
    SwitchClause,
    SelectCase,
}

impl BlockKind {
    /// Clause blocks share the runtime block of their If/Switch.
    pub fn is_faux_child(self) -> bool {
        matches!(self, BlockKind::IfCase | BlockKind::SwitchClause)
    }

    pub fn is_loop(self) -> bool {
        matches!(self, BlockKind::For | BlockKind::Range)
    }

    pub fn is_func(self) -> bool {
        matches!(self, BlockKind::FuncDecl | BlockKind::FuncLit)
    }
}

#[derive(Debug, Clone)]
struct Upgrade {
    index: usize,
    old: TypedValue,
    placeholder: TypeRef,
}

/// Names declared in one block node.
#[derive(Debug, Clone)]
pub struct StaticBlock {
    pub node: Option<NodeId>,
    pub kind: BlockKind,
    pub location: Location,
    pub parent: Option<ScopeId>,
    pub names: Vec<Name>,
    /// Static types; `None` means reserved but not yet defined.
    pub types: Vec<Option<TypeRef>>,
    pub name_sources: Vec<NameSource>,
    /// Slots that must be reallocated per loop iteration.
    pub heap_items: Vec<bool>,
    /// Static values of constants, types and functions.
    pub values: Vec<TypedValue>,
    pub consts: Vec<Name>,
    pub externs: Vec<Name>,
    pub labels: Vec<Name>,
    pub captures: Vec<Capture>,
    index: HashMap<Name, u16>,
    upgrades: Vec<Upgrade>,
}

impl StaticBlock {
    fn new(node: Option<NodeId>, kind: BlockKind, location: Location, parent: Option<ScopeId>) -> Self {
        Self {
            node,
            kind,
            location,
            parent,
            names: Vec::new(),
            types: Vec::new(),
            name_sources: Vec::new(),
            heap_items: Vec::new(),
            values: Vec::new(),
            consts: Vec::new(),
            externs: Vec::new(),
            labels: Vec::new(),
            captures: Vec::new(),
            index: HashMap::new(),
            upgrades: Vec::new(),
        }
    }

    pub fn num_names(&self) -> usize {
        self.names.len()
    }

    pub fn local_index(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.consts.iter().any(|c| c == name)
    }

    /// Checks the parallel-array invariant.
    pub fn check_invariant(&self) -> bool {
        let n = self.names.len();
        self.types.len() == n
            && self.name_sources.len() == n
            && self.heap_items.len() == n
            && self.values.len() == n
            && self.index.len() <= n
    }

    fn push(&mut self, is_const: bool, name: &str, ty: Option<TypeRef>, tv: TypedValue, src: NameSource) -> Result<u16, String> {
        if self.names.len() >= u16::MAX as usize {
            return Err("too many variables in block".to_string());
        }
        let idx = self.names.len() as u16;
        self.names.push(name.to_string());
        self.types.push(ty);
        self.name_sources.push(src);
        self.heap_items.push(false);
        self.values.push(tv);
        if is_const {
            self.consts.push(name.to_string());
        }
        self.index.insert(name.to_string(), idx);
        Ok(idx)
    }

    fn add_extern(&mut self, name: &str) {
        if !self.externs.iter().any(|e| e == name) {
            self.externs.push(name.to_string());
        }
    }
}

/// Arena of static blocks.
#[derive(Debug)]
pub struct Scopes {
    arena: Arena<StaticBlock>,
    pub uverse: ScopeId,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let uverse = arena.alloc(StaticBlock::new(
            None,
            BlockKind::Uverse,
            Location::new("", ".uverse", Default::default()),
            None,
        ));
        Self { arena, uverse }
    }

    pub fn new_block(&mut self, node: Option<NodeId>, kind: BlockKind, location: Location, parent: ScopeId) -> ScopeId {
        self.arena
            .alloc(StaticBlock::new(node, kind, location, Some(parent)))
    }

    pub fn get(&self, id: ScopeId) -> &StaticBlock {
        &self.arena[id]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut StaticBlock {
        &mut self.arena[id]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.arena[id].parent
    }

    /// Adds `name` or overwrites it, taking the static type from the value.
    pub fn define(&mut self, sid: ScopeId, name: &str, tv: TypedValue) -> Result<u16, String> {
        let sb = &mut self.arena[sid];
        if let Some(idx) = sb.local_index(name) {
            sb.types[idx as usize] = tv.ty;
            sb.values[idx as usize] = tv;
            return Ok(idx);
        }
        let ty = tv.ty;
        sb.push(false, name, ty, tv, NameSource::Define)
    }

    /// Adds `name` without a type, if it is not already there.
    pub fn reserve(&mut self, sid: ScopeId, is_const: bool, name: &str, source: NameSource) -> Result<u16, String> {
        let sb = &mut self.arena[sid];
        if let Some(idx) = sb.local_index(name) {
            return Ok(idx);
        }
        sb.push(is_const, name, None, TypedValue::undefined(), source)
    }

    /// Defines `name` with a static type and value. Redefinition keeps the
    /// constness and the type, except that a placeholder function type may
    /// be filled in once; the upgrade can be rolled back.
    pub fn define2(
        &mut self,
        types: &mut Types,
        sid: ScopeId,
        is_const: bool,
        name: &str,
        static_type: Option<TypeRef>,
        tv: TypedValue,
        source: NameSource,
    ) -> Result<u16, String> {
        if name.is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if name == "_" {
            return Ok(0);
        }
        let sb = &mut self.arena[sid];
        let Some(idx) = sb.local_index(name) else {
            return sb.push(is_const, name, static_type, tv, source);
        };
        let i = idx as usize;
        if sb.is_const(name) != is_const {
            return Err(format!("cannot change const status of {name}"));
        }
        let old = sb.values[i].clone();
        let mut static_type = static_type;
        let mut tv = tv;
        if let (Some(old_t), Some(new_t)) = (old.ty, tv.ty)
            && !old.is_undefined()
        {
            if types.is_placeholder(old_t) {
                types.fill_placeholder(old_t, new_t)?;
                tv.ty = Some(old_t);
                static_type = Some(old_t);
                sb.upgrades.push(Upgrade {
                    index: i,
                    old: old.clone(),
                    placeholder: old_t,
                });
            } else if !types.same(old_t, new_t) && !types.same(types.base_of(old_t), types.base_of(new_t)) {
                return Err(format!(
                    "cannot change type of {name}; was {}, new {}",
                    types.type_id(old_t),
                    types.type_id(new_t)
                ));
            }
        }
        sb.values[i] = tv;
        sb.types[i] = static_type;
        sb.name_sources[i] = source;
        Ok(idx)
    }

    /// Undoes placeholder upgrades recorded since the last commit.
    pub fn rollback(&mut self, types: &mut Types, sid: ScopeId) {
        let sb = &mut self.arena[sid];
        for up in sb.upgrades.drain(..).rev() {
            types.reset_placeholder(up.placeholder);
            sb.types[up.index] = up.old.ty;
            sb.values[up.index] = up.old;
        }
    }

    pub fn commit(&mut self, sid: ScopeId) {
        self.arena[sid].upgrades.clear();
    }

    /// Copies the names of `from` into `to`, which must be empty, so that
    /// indices agree between a faux block and its clause.
    pub fn copy_names(&mut self, from: ScopeId, to: ScopeId) -> Result<(), String> {
        let src = self.arena[from].clone();
        let dst = &mut self.arena[to];
        if dst.num_names() != 0 {
            return Err("clause block already has names".to_string());
        }
        for i in 0..src.num_names() {
            dst.push(
                src.is_const(&src.names[i]),
                &src.names[i],
                src.types[i],
                src.values[i].clone(),
                src.name_sources[i],
            )?;
            dst.heap_items[i] = src.heap_items[i];
        }
        Ok(())
    }

    /// Finds the block declaring `name`, starting at `sid`.
    pub fn lookup(&self, sid: ScopeId, name: &str) -> Option<(ScopeId, u16)> {
        let mut cur = Some(sid);
        while let Some(s) = cur {
            if let Some(idx) = self.arena[s].local_index(name) {
                return Some((s, idx));
            }
            cur = self.arena[s].parent;
        }
        None
    }

    /// Resolves `name` as seen from `sid`. Loop variables referenced from a
    /// function literal are captured into that literal's block first.
    pub fn get_path_for_name(&mut self, sid: ScopeId, name: &str) -> Result<ValuePath, String> {
        if name == "_" {
            return Ok(ValuePath::block(0, 0, "_"));
        }
        loop {
            let path = self.resolve(sid, name)?;
            if path.kind != PathKind::Block {
                return Ok(path);
            }
            match self.pending_capture(sid, &path) {
                Some(func_scope) => self.capture(func_scope, name)?,
                None => return Ok(path),
            }
        }
    }

    fn resolve(&mut self, sid: ScopeId, name: &str) -> Result<ValuePath, String> {
        if let Some(idx) = self.arena[sid].local_index(name) {
            return Ok(ValuePath::block(1, idx, name));
        }
        let mut hops: u32 = 1;
        let mut faux: u32 = 0;
        let mut cur = sid;
        loop {
            if self.arena[cur].kind != BlockKind::File {
                self.arena[cur].add_extern(name);
            }
            if self.arena[cur].kind.is_faux_child() {
                faux += 1;
            }
            let Some(parent) = self.arena[cur].parent else {
                break;
            };
            hops += 1;
            cur = parent;
            if cur == self.uverse {
                break;
            }
            if let Some(idx) = self.arena[cur].local_index(name) {
                let depth = hops - faux;
                if depth > MAX_DEPTH as u32 {
                    return Err(format!("value path depth overflow for {name}"));
                }
                return Ok(ValuePath::block(depth as u8, idx, name));
            }
        }
        match self.arena[self.uverse].local_index(name) {
            Some(idx) => Ok(ValuePath::uverse(idx, name)),
            None => Err(format!("name {name} not declared")),
        }
    }

    /// Scope that holds the block addressed by `path` from `sid`.
    pub fn scope_at_depth(&self, sid: ScopeId, depth: u8) -> Option<ScopeId> {
        let mut cur = sid;
        let mut d = 1u8;
        while d < depth {
            if self.arena[cur].kind.is_faux_child() {
                cur = self.arena[cur].parent?;
            }
            cur = self.arena[cur].parent?;
            d += 1;
        }
        Some(cur)
    }

    /// The outermost function literal between `sid` and the loop block that
    /// declares the variable at `path`, if the variable must be captured.
    fn pending_capture(&self, sid: ScopeId, path: &ValuePath) -> Option<ScopeId> {
        let decl = self.scope_at_depth(sid, path.depth)?;
        if !self.arena[decl].kind.is_loop() {
            return None;
        }
        let src = self.arena[decl].name_sources[path.index as usize];
        if matches!(src, NameSource::Capture) {
            return None;
        }
        let mut outermost = None;
        let mut cur = sid;
        while cur != decl {
            if self.arena[cur].kind == BlockKind::FuncLit {
                outermost = Some(cur);
            }
            cur = self.arena[cur].parent?;
        }
        outermost
    }

    fn capture(&mut self, func_scope: ScopeId, name: &str) -> Result<(), String> {
        let parent = self
            .parent(func_scope)
            .ok_or_else(|| format!("function literal without parent capturing {name}"))?;
        let source = self.get_path_for_name(parent, name)?;
        if let Some(decl) = self.scope_at_depth(parent, source.depth) {
            self.arena[decl].heap_items[source.index as usize] = true;
        }
        let ty = self.static_type_of(parent, &source);
        let fb = &mut self.arena[func_scope];
        let index = fb.push(false, name, ty, TypedValue::undefined(), NameSource::Capture)?;
        fb.heap_items[index as usize] = true;
        fb.captures.push(Capture {
            name: name.to_string(),
            index,
            source,
        });
        Ok(())
    }

    /// Static type of the slot a block path refers to.
    pub fn static_type_of(&self, sid: ScopeId, path: &ValuePath) -> Option<TypeRef> {
        match path.kind {
            PathKind::Uverse => self.arena[self.uverse].types.get(path.index as usize).copied().flatten(),
            PathKind::Block => {
                let s = self.scope_at_depth(sid, path.depth)?;
                self.arena[s].types.get(path.index as usize).copied().flatten()
            }
            _ => None,
        }
    }

    /// Static value of the slot a block path refers to.
    pub fn static_value_of(&self, sid: ScopeId, path: &ValuePath) -> Option<&TypedValue> {
        match path.kind {
            PathKind::Uverse => self.arena[self.uverse].values.get(path.index as usize),
            PathKind::Block => {
                let s = self.scope_at_depth(sid, path.depth)?;
                self.arena[s].values.get(path.index as usize)
            }
            _ => None,
        }
    }

    pub fn name_source_of(&self, sid: ScopeId, path: &ValuePath) -> Option<NameSource> {
        match path.kind {
            PathKind::Uverse => self.arena[self.uverse].name_sources.get(path.index as usize).copied(),
            PathKind::Block => {
                let s = self.scope_at_depth(sid, path.depth)?;
                self.arena[s].name_sources.get(path.index as usize).copied()
            }
            _ => None,
        }
    }

    /// Nearest enclosing function block.
    pub fn func_scope(&self, sid: ScopeId) -> Option<ScopeId> {
        let mut cur = Some(sid);
        while let Some(s) = cur {
            if self.arena[s].kind.is_func() {
                return Some(s);
            }
            cur = self.arena[s].parent;
        }
        None
    }

    /// Nearest enclosing block of one of `kinds`.
    pub fn enclosing(&self, sid: ScopeId, kinds: &[BlockKind]) -> Option<ScopeId> {
        let mut cur = Some(sid);
        while let Some(s) = cur {
            if kinds.contains(&self.arena[s].kind) {
                return Some(s);
            }
            cur = self.arena[s].parent;
        }
        None
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::values::Value;

    fn loc(line: u32) -> Location {
        Location::new("main", "main.gno", Span::at(line, 1, line, 10))
    }

    fn int_value(types: &Types, i: i64) -> TypedValue {
        TypedValue::new(types.int(), Value::Int(i))
    }

    // ====================================================================
    // ValuePath
    // ====================================================================

    #[test]
    fn test_value_path_validate() {
        assert!(ValuePath::block(1, 0, "x").validate().is_ok());
        assert!(ValuePath::uverse(3, "len").validate().is_ok());
        let mut p = ValuePath::selector(PathKind::Field, 2, "f");
        assert!(p.validate().is_ok());
        p.depth = 1;
        assert!(p.validate().is_err());
        assert!(ValuePath::block(128, 0, "x").validate().is_err());
    }

    // ====================================================================
    // Resolution
    // ====================================================================

    #[test]
    fn test_path_depth_counts_blocks() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        let file = scopes.new_block(None, BlockKind::File, loc(1), pkg);
        let func = scopes.new_block(None, BlockKind::FuncDecl, loc(2), file);
        let blk = scopes.new_block(None, BlockKind::Block, loc(3), func);
        scopes.define(pkg, "g", int_value(&types, 1)).unwrap();
        scopes.define(func, "x", int_value(&types, 2)).unwrap();

        assert_eq!(scopes.get_path_for_name(blk, "x").unwrap(), ValuePath::block(2, 0, "x"));
        assert_eq!(scopes.get_path_for_name(blk, "g").unwrap(), ValuePath::block(4, 0, "g"));
        assert!(scopes.get(blk).externs.contains(&"g".to_string()));
        assert!(!scopes.get(file).externs.contains(&"g".to_string()));
    }

    #[test]
    fn test_path_is_stable() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        let blk = scopes.new_block(None, BlockKind::Block, loc(2), pkg);
        scopes.define(pkg, "a", int_value(&types, 1)).unwrap();
        let first = scopes.get_path_for_name(blk, "a").unwrap();
        let second = scopes.get_path_for_name(blk, "a").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_faux_blocks_do_not_count() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let func = scopes.new_block(None, BlockKind::FuncDecl, loc(1), scopes.uverse);
        let if_ = scopes.new_block(None, BlockKind::If, loc(2), func);
        scopes.define(func, "outer", int_value(&types, 1)).unwrap();
        scopes.define(if_, "v", int_value(&types, 2)).unwrap();
        let case = scopes.new_block(None, BlockKind::IfCase, loc(3), if_);
        scopes.copy_names(if_, case).unwrap();

        assert_eq!(scopes.get_path_for_name(case, "v").unwrap(), ValuePath::block(1, 0, "v"));
        assert_eq!(
            scopes.get_path_for_name(case, "outer").unwrap(),
            ValuePath::block(2, 0, "outer")
        );
    }

    #[test]
    fn test_undeclared_name() {
        let mut scopes = Scopes::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        let err = scopes.get_path_for_name(pkg, "nope").unwrap_err();
        assert_eq!(err, "name nope not declared");
    }

    #[test]
    fn test_uverse_fallback() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let uverse = scopes.uverse;
        scopes.define(uverse, "len", int_value(&types, 0)).unwrap();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), uverse);
        let path = scopes.get_path_for_name(pkg, "len").unwrap();
        assert_eq!(path.kind, PathKind::Uverse);
        assert_eq!(path.depth, 0);
    }

    #[test]
    fn test_uverse_name_source_is_per_name() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        let uverse = scopes.uverse;
        let tt = types.type_type();
        let int = types.int();
        let int_type = TypedValue::new(tt, Value::Type(int));
        scopes
            .define2(&mut types, uverse, false, "int", Some(tt), int_type, NameSource::Type)
            .unwrap();
        scopes.define(uverse, "len", int_value(&types, 0)).unwrap();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), uverse);

        let int_path = scopes.get_path_for_name(pkg, "int").unwrap();
        assert_eq!(scopes.name_source_of(pkg, &int_path), Some(NameSource::Type));
        let len_path = scopes.get_path_for_name(pkg, "len").unwrap();
        assert_eq!(scopes.name_source_of(pkg, &len_path), Some(NameSource::Define));
    }

    // ====================================================================
    // Definition
    // ====================================================================

    #[test]
    fn test_scope_invariant_holds() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        scopes.reserve(pkg, false, "a", NameSource::Var).unwrap();
        scopes.define(pkg, "b", int_value(&types, 1)).unwrap();
        let int = types.int();
        let three = int_value(&types, 3);
        scopes
            .define2(&mut types, pkg, true, "c", Some(int), three, NameSource::Const)
            .unwrap();
        assert!(scopes.get(pkg).check_invariant());
        assert_eq!(scopes.get(pkg).num_names(), 3);
        assert_eq!(scopes.get(pkg).types[0], None);
    }

    #[test]
    fn test_redefinition_cannot_change_const() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        let int = types.int();
        let one = int_value(&types, 1);
        scopes
            .define2(&mut types, pkg, true, "c", Some(int), one.clone(), NameSource::Const)
            .unwrap();
        let err = scopes
            .define2(&mut types, pkg, false, "c", Some(int), one, NameSource::Var)
            .unwrap_err();
        assert!(err.contains("const status"));
    }

    #[test]
    fn test_redefinition_cannot_change_type() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        let int = types.int();
        let string = types.string();
        let one = int_value(&types, 1);
        scopes
            .define2(&mut types, pkg, false, "v", Some(int), one, NameSource::Var)
            .unwrap();
        let err = scopes
            .define2(
                &mut types,
                pkg,
                false,
                "v",
                Some(string),
                TypedValue::new(string, Value::string("s")),
                NameSource::Var,
            )
            .unwrap_err();
        assert!(err.contains("cannot change type"));
    }

    #[test]
    fn test_placeholder_upgrade_and_rollback() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        let pkg = scopes.new_block(None, BlockKind::Package, loc(1), scopes.uverse);
        let ph = types.new_placeholder();
        scopes
            .define2(&mut types, pkg, false, "f", Some(ph), TypedValue::new(ph, Value::None), NameSource::Func)
            .unwrap();
        let real = types.func(vec![], vec![], false);
        scopes
            .define2(&mut types, pkg, false, "f", Some(real), TypedValue::new(real, Value::None), NameSource::Func)
            .unwrap();
        assert!(!types.is_placeholder(ph));
        assert!(types.same(ph, real));

        scopes.rollback(&mut types, pkg);
        assert!(types.is_placeholder(ph));
        assert_eq!(scopes.get(pkg).types[0], Some(ph));
    }

    // ====================================================================
    // Loop variable capture
    // ====================================================================

    #[test]
    fn test_loop_var_captured_by_func_lit() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let func = scopes.new_block(None, BlockKind::FuncDecl, loc(1), scopes.uverse);
        let for_ = scopes.new_block(None, BlockKind::For, loc(2), func);
        scopes.define(for_, "i", int_value(&types, 0)).unwrap();
        let lit = scopes.new_block(None, BlockKind::FuncLit, loc(3), for_);

        let path = scopes.get_path_for_name(lit, "i").unwrap();
        assert_eq!(path, ValuePath::block(1, 0, "i"));
        assert!(scopes.get(for_).heap_items[0]);
        let caps = &scopes.get(lit).captures;
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].source, ValuePath::block(1, 0, "i"));
        assert_eq!(scopes.get(lit).name_sources[0], NameSource::Capture);
    }

    #[test]
    fn test_nested_func_lits_capture_outermost_first() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let func = scopes.new_block(None, BlockKind::FuncDecl, loc(1), scopes.uverse);
        let range = scopes.new_block(None, BlockKind::Range, loc(2), func);
        scopes.define(range, "v", int_value(&types, 0)).unwrap();
        let outer = scopes.new_block(None, BlockKind::FuncLit, loc(3), range);
        let inner = scopes.new_block(None, BlockKind::FuncLit, loc(4), outer);

        let path = scopes.get_path_for_name(inner, "v").unwrap();
        assert_eq!(path, ValuePath::block(1, 0, "v"));
        assert_eq!(scopes.get(outer).captures[0].source, ValuePath::block(1, 0, "v"));
        assert_eq!(scopes.get(inner).captures[0].source, ValuePath::block(1, 0, "v"));
    }

    #[test]
    fn test_non_loop_var_not_captured() {
        let mut scopes = Scopes::new();
        let types = Types::new();
        let func = scopes.new_block(None, BlockKind::FuncDecl, loc(1), scopes.uverse);
        scopes.define(func, "x", int_value(&types, 0)).unwrap();
        let lit = scopes.new_block(None, BlockKind::FuncLit, loc(3), func);
        assert_eq!(scopes.get_path_for_name(lit, "x").unwrap(), ValuePath::block(2, 0, "x"));
        assert!(scopes.get(lit).captures.is_empty());
    }
}
