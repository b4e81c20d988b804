//! Assignability, interface satisfaction and selector lookup

use super::{Kind, Type, TypeRef, Types};
use crate::scope::{PathKind, ValuePath};

/// Checks that a value of static type `src` may be assigned to `dst`.
/// `auto_native` lets native types pass in either direction.
pub fn check_type(types: &Types, src: TypeRef, dst: TypeRef, auto_native: bool) -> Result<(), String> {
    if types.same(src, dst) {
        return Ok(());
    }
    if auto_native && (types.kind(src) == Kind::Native || types.kind(dst) == Kind::Native) {
        return Ok(());
    }
    if types.is_interface(dst) {
        return implements(types, src, dst);
    }
    if let Some(p) = types.primitive(src)
        && p.is_untyped()
    {
        let dk = types.kind(dst);
        let ok = match p.kind() {
            Kind::Bool => dk == Kind::Bool,
            Kind::String => dk == Kind::String,
            _ => dk.is_numeric(),
        };
        return if ok {
            Ok(())
        } else {
            Err(mismatch(types, src, dst))
        };
    }
    let src_declared = types.is_declared(src);
    let dst_declared = types.is_declared(dst);
    if src_declared || dst_declared {
        // an unsealed type is still being defined; compare by base
        let unsealed = !types.is_sealed(src) || !types.is_sealed(dst);
        let other = if src_declared { dst } else { src };
        let named_other = types.is_declared(other) || types.primitive(other).is_some();
        if (unsealed || (!(src_declared && dst_declared) && !named_other))
            && types.same(types.base_of(src), types.base_of(dst))
        {
            return Ok(());
        }
        return Err(mismatch(types, src, dst));
    }
    match (types.get(src), types.get(dst)) {
        (Type::Pointer(a), Type::Pointer(b)) | (Type::Slice(a), Type::Slice(b)) => {
            if types.same(*a, *b) {
                return Ok(());
            }
        }
        (Type::Array { len: la, elt: a }, Type::Array { len: lb, elt: b }) => {
            if la == lb && types.same(*a, *b) {
                return Ok(());
            }
        }
        (Type::Map { key: ka, value: va }, Type::Map { key: kb, value: vb }) => {
            if types.same(*ka, *kb) && types.same(*va, *vb) {
                return Ok(());
            }
        }
        (Type::Chan { elt: a, .. }, Type::Chan { elt: b, .. }) => {
            if types.same(*a, *b) {
                return Ok(());
            }
        }
        _ => {}
    }
    Err(mismatch(types, src, dst))
}

fn mismatch(types: &Types, src: TypeRef, dst: TypeRef) -> String {
    format!(
        "cannot use {} as {}",
        types.type_string(src),
        types.type_string(dst)
    )
}

/// Checks that `t` implements interface `iface`: every method is present
/// with an identical signature and is callable on a `t` value.
pub fn implements(types: &Types, t: TypeRef, iface: TypeRef) -> Result<(), String> {
    let Some(methods) = types.interface_methods(iface) else {
        return Err(format!("{} is not an interface", types.type_string(iface)));
    };
    for m in methods {
        let found = match types.interface_methods(t) {
            Some(own) => own.iter().find(|o| o.name == m.name).map(|o| (o.ty, true)),
            None => match find_selector(types, t, &m.name)? {
                Some(sel) if sel.is_method() => Some((sel.ty, !sel.needs_addr || sel.through_ptr)),
                _ => None,
            },
        };
        match found {
            None => {
                return Err(format!(
                    "{} does not implement {} (missing method {})",
                    types.type_string(t),
                    types.type_string(iface),
                    m.name
                ));
            }
            Some((_, false)) => {
                return Err(format!(
                    "{} does not implement {} (method {} has pointer receiver)",
                    types.type_string(t),
                    types.type_string(iface),
                    m.name
                ));
            }
            Some((ty, true)) => {
                if !types.same(ty, m.ty) {
                    return Err(format!(
                        "{} does not implement {} (wrong type for method {})",
                        types.type_string(t),
                        types.type_string(iface),
                        m.name
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Result of resolving `x.name` against the static type of `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Embedded field steps followed by the final field or method step.
    pub path: Vec<ValuePath>,
    /// Field type, or method signature without receiver.
    pub ty: TypeRef,
    /// The final receiver must have its address taken.
    pub needs_addr: bool,
    /// A pointer was dereferenced on the way, so the final receiver is
    /// addressable.
    pub through_ptr: bool,
}

impl Selection {
    pub fn is_method(&self) -> bool {
        self.path.last().is_some_and(|p| {
            matches!(
                p.kind,
                PathKind::ValueMethod
                    | PathKind::PtrMethod
                    | PathKind::DerefValueMethod
                    | PathKind::InterfaceMethod
            )
        })
    }
}

/// Looks up a field or method, searching embedded fields breadth first.
/// The shallowest match wins; two matches at the same depth are ambiguous.
pub fn find_selector(types: &Types, t: TypeRef, name: &str) -> Result<Option<Selection>, String> {
    let mut level = vec![(Vec::<ValuePath>::new(), t, false)];
    for _ in 0..16 {
        let mut matches = Vec::new();
        let mut next = Vec::new();
        for (trail, ty, through) in &level {
            let (is_ptr, recv) = deref(types, *ty);
            if let Some((step, sel_ty, needs_addr)) = select_direct(types, *ty, name) {
                let mut path = trail.clone();
                path.push(step);
                matches.push(Selection {
                    path,
                    ty: sel_ty,
                    needs_addr,
                    through_ptr: *through || is_ptr,
                });
                continue;
            }
            if let Some(fields) = types.struct_fields(recv) {
                for (i, f) in fields.iter().enumerate() {
                    if !f.embedded {
                        continue;
                    }
                    let kind = if is_ptr {
                        PathKind::DerefField
                    } else {
                        PathKind::Field
                    };
                    let mut path = trail.clone();
                    path.push(ValuePath::selector(kind, i as u16, f.name.clone()));
                    next.push((path, f.ty, *through || is_ptr));
                }
            }
        }
        match matches.len() {
            0 => {}
            1 => return Ok(matches.pop()),
            _ => return Err(format!("ambiguous selector {name}")),
        }
        if next.is_empty() {
            return Ok(None);
        }
        level = next;
    }
    Ok(None)
}

fn deref(types: &Types, t: TypeRef) -> (bool, TypeRef) {
    match types.get(t) {
        Type::Pointer(e) => (true, *e),
        _ => (false, t),
    }
}

fn select_direct(types: &Types, t: TypeRef, name: &str) -> Option<(ValuePath, TypeRef, bool)> {
    let (is_ptr, recv) = deref(types, t);
    if let Some(dt) = types.declared(recv)
        && let Some((i, m)) = dt.find_method(name)
    {
        let kind = match (is_ptr, m.ptr_receiver) {
            (false, false) => PathKind::ValueMethod,
            (true, false) => PathKind::DerefValueMethod,
            (_, true) => PathKind::PtrMethod,
        };
        return Some((
            ValuePath::selector(kind, i as u16, name),
            m.ty,
            !is_ptr && m.ptr_receiver,
        ));
    }
    if !is_ptr && let Some(methods) = types.interface_methods(recv) {
        let (i, m) = methods.iter().enumerate().find(|(_, m)| m.name == name)?;
        return Some((
            ValuePath::selector(PathKind::InterfaceMethod, i as u16, name),
            m.ty,
            false,
        ));
    }
    let fields = types.struct_fields(recv)?;
    let (i, f) = fields.iter().enumerate().find(|(_, f)| f.name == name)?;
    let kind = if is_ptr {
        PathKind::DerefField
    } else {
        PathKind::Field
    };
    Some((ValuePath::selector(kind, i as u16, name), f.ty, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldType, Method};

    fn method(types: &mut Types, t: TypeRef, name: &str, ptr: bool, sig: TypeRef) {
        types
            .add_method(
                t,
                Method {
                    name: name.into(),
                    ty: sig,
                    ptr_receiver: ptr,
                    func: None,
                },
            )
            .unwrap();
    }

    fn setup() -> (Types, TypeRef, TypeRef) {
        let mut types = Types::new();
        let string = types.string();
        let int = types.int();
        let s = types.struct_("main", vec![FieldType::new("n", int)]);
        let t = types.declare("main", "T", None);
        types.set_base(t, s).unwrap();
        let str_sig = types.func(vec![], vec![string], false);
        let int_sig = types.func(vec![], vec![int], false);
        method(&mut types, t, "String", false, str_sig);
        method(&mut types, t, "Len", true, int_sig);
        types.seal(t).unwrap();
        (types, t, str_sig)
    }

    // ====================================================================
    // Interface satisfaction
    // ====================================================================

    #[test]
    fn test_empty_interface_accepts_all() {
        let (types, t, _) = setup();
        let any = types.empty_interface();
        assert!(implements(&types, t, any).is_ok());
        assert!(implements(&types, types.int(), any).is_ok());
    }

    #[test]
    fn test_one_method_interface() {
        let (mut types, t, str_sig) = setup();
        let stringer = types.interface("main", vec![FieldType::new("String", str_sig)]);
        assert!(implements(&types, t, stringer).is_ok());
        let err = implements(&types, types.int(), stringer).unwrap_err();
        assert!(err.contains("missing method String"));
    }

    #[test]
    fn test_two_method_interface_needs_pointer() {
        let (mut types, t, str_sig) = setup();
        let int = types.int();
        let int_sig = types.func(vec![], vec![int], false);
        let both = types.interface(
            "main",
            vec![
                FieldType::new("String", str_sig),
                FieldType::new("Len", int_sig),
            ],
        );
        let err = implements(&types, t, both).unwrap_err();
        assert!(err.contains("pointer receiver"));
        let pt = types.pointer(t);
        assert!(implements(&types, pt, both).is_ok());
    }

    #[test]
    fn test_wrong_method_type() {
        let (mut types, t, _) = setup();
        let int = types.int();
        let wrong = types.func(vec![], vec![int], false);
        let iface = types.interface("main", vec![FieldType::new("String", wrong)]);
        let err = implements(&types, t, iface).unwrap_err();
        assert!(err.contains("wrong type for method String"));
    }

    #[test]
    fn test_error_interface() {
        let (mut types, t, _) = setup();
        assert!(implements(&types, t, types.error()).is_err());
        let string = types.string();
        let sig = types.func(vec![], vec![string], false);
        let e = types.declare("main", "E", None);
        types.set_base(e, string).unwrap();
        method(&mut types, e, "Error", false, sig);
        types.seal(e).unwrap();
        assert!(check_type(&types, e, types.error(), false).is_ok());
    }

    // ====================================================================
    // Assignability
    // ====================================================================

    #[test]
    fn test_named_and_unnamed() {
        let mut types = Types::new();
        let int = types.int();
        let ints = types.slice(int);
        let named = types.declare("main", "Ints", None);
        types.set_base(named, ints).unwrap();
        types.seal(named).unwrap();
        assert!(check_type(&types, ints, named, false).is_ok());
        assert!(check_type(&types, named, ints, false).is_ok());

        let my_int = types.declare("main", "MyInt", None);
        types.set_base(my_int, int).unwrap();
        types.seal(my_int).unwrap();
        assert!(check_type(&types, int, my_int, false).is_err());
        assert!(check_type(&types, types.prim(crate::types::PrimitiveType::UntypedBigint), my_int, false).is_ok());
    }

    // ====================================================================
    // Selectors
    // ====================================================================

    #[test]
    fn test_embedded_promotion_shallowest_wins() {
        let mut types = Types::new();
        let int = types.int();
        let inner = types.struct_("main", vec![FieldType::new("x", int)]);
        let inner_t = types.declare("main", "Inner", None);
        types.set_base(inner_t, inner).unwrap();
        let mut emb = FieldType::new("Inner", inner_t);
        emb.embedded = true;
        let outer = types.struct_("main", vec![emb, FieldType::new("y", int)]);

        let sel = find_selector(&types, outer, "x").unwrap().unwrap();
        assert_eq!(sel.path.len(), 2);
        assert_eq!(sel.path[0].kind, PathKind::Field);
        assert_eq!(sel.path[1], ValuePath::selector(PathKind::Field, 0, "x"));

        let sel = find_selector(&types, outer, "y").unwrap().unwrap();
        assert_eq!(sel.path, vec![ValuePath::selector(PathKind::Field, 1, "y")]);
        assert!(find_selector(&types, outer, "z").unwrap().is_none());
    }

    #[test]
    fn test_ambiguous_selector() {
        let mut types = Types::new();
        let int = types.int();
        let a = types.struct_("main", vec![FieldType::new("x", int)]);
        let at = types.declare("main", "A", None);
        types.set_base(at, a).unwrap();
        let bt = types.declare("main", "B", None);
        types.set_base(bt, a).unwrap();
        let mut ea = FieldType::new("A", at);
        ea.embedded = true;
        let mut eb = FieldType::new("B", bt);
        eb.embedded = true;
        let outer = types.struct_("main", vec![ea, eb]);
        let err = find_selector(&types, outer, "x").unwrap_err();
        assert_eq!(err, "ambiguous selector x");
    }

    #[test]
    fn test_pointer_receiver_selection() {
        let (mut types, t, _) = setup();
        let sel = find_selector(&types, t, "Len").unwrap().unwrap();
        assert_eq!(sel.path[0].kind, PathKind::PtrMethod);
        assert!(sel.needs_addr);
        let pt = types.pointer(t);
        let sel = find_selector(&types, pt, "String").unwrap().unwrap();
        assert_eq!(sel.path[0].kind, PathKind::DerefValueMethod);
        let sel = find_selector(&types, pt, "n").unwrap().unwrap();
        assert_eq!(sel.path[0].kind, PathKind::DerefField);
    }
}
