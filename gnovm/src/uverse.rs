//! The universe block: builtin types, constants and functions
//!
//! Builtin functions are natives with an empty package path. Their calls
//! are specialized by the preprocessor, which checks arity and computes
//! the result type, so the natives here only see well-typed arguments.

use crate::interp::{ErrorKind, InterpResult, Machine, RuntimeError};
use crate::scope::{NameSource, Scopes};
use crate::types::{PrimitiveType, Type, TypeRef, Types};
use crate::values::{
    ArrayValue, FuncValue, MapValue, NativeFn, Pointer, SliceValue, TypedValue, Value, map_key, new_slot, zero_value,
};
use num_bigint::BigInt;
use std::rc::Rc;

fn define_type(scopes: &mut Scopes, types: &mut Types, name: &str, t: TypeRef) -> Result<(), String> {
    let type_type = types.type_type();
    let tv = TypedValue::new(type_type, Value::Type(t));
    let uverse = scopes.uverse;
    scopes.define2(types, uverse, false, name, Some(type_type), tv, NameSource::Type)?;
    Ok(())
}

/// Populates the universe scope.
pub fn define_uverse(scopes: &mut Scopes, types: &mut Types) -> Result<(), String> {
    let uverse = scopes.uverse;
    for p in PrimitiveType::ALL {
        if !p.is_untyped() {
            let t = types.prim(p);
            define_type(scopes, types, p.name(), t)?;
        }
    }
    let (uint8, int32, error) = (types.uint8(), types.int32(), types.error());
    define_type(scopes, types, "byte", uint8)?;
    define_type(scopes, types, "rune", int32)?;
    define_type(scopes, types, "error", error)?;

    let ub = types.untyped_bool();
    for (name, b) in [("true", true), ("false", false)] {
        let tv = TypedValue::new(ub, Value::Bool(b));
        scopes.define2(types, uverse, true, name, Some(ub), tv, NameSource::Const)?;
    }
    scopes.define2(types, uverse, true, "nil", None, TypedValue::undefined(), NameSource::Const)?;
    let ui = types.prim(PrimitiveType::UntypedBigint);
    let iota = TypedValue::new(ui, Value::bigint(BigInt::from(0)));
    scopes.define2(types, uverse, true, "iota", Some(ui), iota, NameSource::Const)?;

    let natives: [(&str, NativeFn); 12] = [
        ("append", builtin_append),
        ("cap", builtin_cap),
        ("close", builtin_close),
        ("copy", builtin_copy),
        ("delete", builtin_delete),
        ("len", builtin_len),
        ("make", builtin_make),
        ("new", builtin_new),
        ("panic", builtin_panic),
        ("print", builtin_print),
        ("println", builtin_println),
        ("recover", builtin_recover),
    ];
    for (name, f) in natives {
        let ty = types.native(format!("builtin {name}"));
        let fv = FuncValue {
            ty,
            name: name.to_string(),
            source: None,
            pkg_path: String::new(),
            closure: None,
            captures: Vec::new(),
            native: Some(f),
            is_method: false,
        };
        let tv = TypedValue::new(ty, Value::Func(Rc::new(fv)));
        scopes.define2(types, uverse, false, name, Some(ty), tv, NameSource::Builtin)?;
    }
    Ok(())
}

/// Whether `tv` is one of the builtin functions.
pub fn builtin_name(tv: &TypedValue) -> Option<&str> {
    match &tv.v {
        Value::Func(fv) if fv.pkg_path.is_empty() && fv.native.is_some() && fv.source.is_none() => {
            Some(fv.name.as_str())
        }
        _ => None,
    }
}

fn arg(args: &[TypedValue], i: usize, name: &str) -> InterpResult<TypedValue> {
    args.get(i)
        .cloned()
        .ok_or_else(|| RuntimeError::internal(format!("missing argument {i} to {name}")))
}

fn int_result(types: &Types, n: usize) -> Vec<TypedValue> {
    vec![TypedValue::int(types, n as i64)]
}

fn builtin_len(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let x = arg(&args, 0, "len")?;
    let n = match &x.v {
        Value::String(s) => s.len(),
        Value::Array(av) => av.elems.len(),
        Value::Slice(sv) => sv.len,
        Value::Map(mv) => mv.len(),
        Value::Pointer(Pointer::Slot(s)) => match &s.borrow().v {
            Value::Array(av) => av.elems.len(),
            _ => return Err(RuntimeError::internal("invalid argument to len")),
        },
        Value::None => 0,
        _ => return Err(RuntimeError::internal("invalid argument to len")),
    };
    Ok(int_result(m.types, n))
}

fn builtin_cap(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let x = arg(&args, 0, "cap")?;
    let n = match &x.v {
        Value::Array(av) => av.elems.len(),
        Value::Slice(sv) => sv.cap,
        Value::Pointer(Pointer::Slot(s)) => match &s.borrow().v {
            Value::Array(av) => av.elems.len(),
            _ => return Err(RuntimeError::internal("invalid argument to cap")),
        },
        Value::None => 0,
        _ => return Err(RuntimeError::internal("invalid argument to cap")),
    };
    Ok(int_result(m.types, n))
}

/// Appends in place while the backing array has room, otherwise copies
/// into a new array of twice the capacity.
fn builtin_append(m: &mut Machine<'_>, mut args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let types = m.types;
    if args.is_empty() {
        return Err(RuntimeError::internal("missing argument to append"));
    }
    let s = args.remove(0);
    let ty = s.ty;
    let (base, offset, len, cap) = match &s.v {
        Value::Slice(sv) => (Some(sv.base.clone()), sv.offset, sv.len, sv.cap),
        Value::None => (None, 0, 0, 0),
        _ => return Err(RuntimeError::internal("first argument to append must be a slice")),
    };
    if args.is_empty() {
        return Ok(vec![s]);
    }
    let new_len = len + args.len();
    if let Some(base) = base.as_ref().filter(|_| new_len <= cap) {
        for (i, v) in args.into_iter().enumerate() {
            *base.elems[offset + len + i].borrow_mut() = v.copy();
        }
        return Ok(vec![TypedValue {
            ty,
            v: Value::Slice(SliceValue {
                base: base.clone(),
                offset,
                len: new_len,
                cap,
            }),
        }]);
    }
    let new_cap = new_len.max(cap * 2);
    let elem = ty.and_then(|t| types.elem(t));
    let mut elems: Vec<TypedValue> = Vec::with_capacity(new_cap);
    if let Some(base) = &base {
        elems.extend((0..len).map(|i| base.elems[offset + i].borrow().copy()));
    }
    elems.extend(args.into_iter().map(|v| v.copy()));
    while elems.len() < new_cap {
        match elem {
            Some(e) => elems.push(zero_value(types, e)),
            None => elems.push(TypedValue::undefined()),
        }
    }
    Ok(vec![TypedValue {
        ty,
        v: Value::Slice(SliceValue {
            base: Rc::new(ArrayValue::new(elems)),
            offset: 0,
            len: new_len,
            cap: new_cap,
        }),
    }])
}

fn builtin_copy(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let types = m.types;
    let dst = arg(&args, 0, "copy")?;
    let src = arg(&args, 1, "copy")?;
    let Value::Slice(dv) = &dst.v else {
        return Ok(int_result(types, 0));
    };
    let values: Vec<TypedValue> = match &src.v {
        Value::Slice(sv) => sv.values(),
        Value::String(s) => s
            .bytes()
            .map(|b| TypedValue::new(types.uint8(), Value::Uint(b as u64)))
            .collect(),
        _ => Vec::new(),
    };
    let n = dv.len.min(values.len());
    for (i, v) in values.into_iter().take(n).enumerate() {
        if let Some(slot) = dv.slot(i) {
            *slot.borrow_mut() = v.copy();
        }
    }
    Ok(int_result(types, n))
}

fn builtin_delete(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let map = arg(&args, 0, "delete")?;
    let key = arg(&args, 1, "delete")?;
    if let Value::Map(mv) = &map.v {
        let hash = map_key(m.types, &key).map_err(RuntimeError::internal)?;
        mv.delete(&hash);
    }
    Ok(vec![])
}

fn builtin_make(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let types = m.types;
    let Some(Value::Type(t)) = args.first().map(|a| a.v.clone()) else {
        return Err(RuntimeError::internal("first argument to make must be a type"));
    };
    let size = |i: usize| -> InterpResult<Option<usize>> {
        match args.get(i) {
            None => Ok(None),
            Some(a) => match a.as_i64() {
                Some(n) if n >= 0 => Ok(Some(n as usize)),
                _ => Err(RuntimeError::new(
                    ErrorKind::IndexOutOfBounds,
                    "runtime error: makeslice: len out of range",
                )),
            },
        }
    };
    let v = match types.base(t) {
        Type::Slice(elt) => {
            let len = size(1)?.unwrap_or(0);
            let cap = size(2)?.unwrap_or(len);
            if cap < len {
                return Err(RuntimeError::new(
                    ErrorKind::IndexOutOfBounds,
                    "runtime error: makeslice: cap out of range",
                ));
            }
            let elems = (0..cap).map(|_| zero_value(types, *elt)).collect();
            Value::Slice(SliceValue {
                base: Rc::new(ArrayValue::new(elems)),
                offset: 0,
                len,
                cap,
            })
        }
        Type::Map { .. } => Value::Map(Rc::new(MapValue::new())),
        Type::Chan { .. } => return Err(RuntimeError::unsupported("channels")),
        _ => {
            return Err(RuntimeError::internal(format!(
                "cannot make {}",
                types.type_string(t)
            )));
        }
    };
    Ok(vec![TypedValue::new(t, v)])
}

fn builtin_new(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let types = m.types;
    let Some(Value::Type(t)) = args.first().map(|a| a.v.clone()) else {
        return Err(RuntimeError::internal("argument to new must be a type"));
    };
    let ptr = types
        .lookup(&format!("*{}", types.type_id(t)))
        .ok_or_else(|| RuntimeError::internal(format!("pointer type of {} not declared", types.type_string(t))))?;
    let slot = new_slot(zero_value(types, t));
    Ok(vec![TypedValue::new(ptr, Value::Pointer(Pointer::Slot(slot)))])
}

fn builtin_panic(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let v = args.into_iter().next().unwrap_or_default();
    m.start_panic(v)?;
    Ok(vec![])
}

fn print_args(m: &mut Machine<'_>, args: &[TypedValue]) -> String {
    args.iter()
        .map(|a| m.sprint_value(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn builtin_print(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let text = print_args(m, &args);
    m.write_output(&text);
    Ok(vec![])
}

fn builtin_println(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let mut text = print_args(m, &args);
    text.push('\n');
    m.write_output(&text);
    Ok(vec![])
}

fn builtin_recover(m: &mut Machine<'_>, _args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    Ok(vec![m.recover()])
}

fn builtin_close(_m: &mut Machine<'_>, _args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    Err(RuntimeError::unsupported("channels"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uverse_names() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        define_uverse(&mut scopes, &mut types).unwrap();
        let sb = scopes.get(scopes.uverse);
        for name in ["int", "byte", "rune", "error", "true", "nil", "iota", "len", "append", "recover"] {
            assert!(sb.local_index(name).is_some(), "missing {name}");
        }
        assert!(sb.check_invariant());
        let idx = sb.local_index("byte").unwrap() as usize;
        assert!(matches!(sb.values[idx].v, Value::Type(t) if t == types.uint8()));
        assert!(sb.is_const("true"));
        assert!(!sb.is_const("len"));
    }

    #[test]
    fn test_builtin_name() {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        define_uverse(&mut scopes, &mut types).unwrap();
        let sb = scopes.get(scopes.uverse);
        let idx = sb.local_index("append").unwrap() as usize;
        assert_eq!(builtin_name(&sb.values[idx]), Some("append"));
        let idx = sb.local_index("int").unwrap() as usize;
        assert_eq!(builtin_name(&sb.values[idx]), None);
    }
}
