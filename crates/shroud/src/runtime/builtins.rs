//! Native methods of the builtin classes.

use super::Runtime;
use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    types::{ClassAttr, NativeFunction, Type},
    value::Value,
};

type Method = fn(&mut Runtime, &ArgValues) -> RunResult<Value>;

const METHODS: &[(Type, &str, Method)] = &[
    (Type::List, "append", list_append),
    (Type::List, "extend", list_extend),
    (Type::Dict, "get", dict_get),
    (Type::Dict, "keys", dict_keys),
    (Type::Str, "upper", str_upper),
];

pub(super) fn install_methods(rt: &mut Runtime) {
    for &(ty, name, method) in METHODS {
        let class_id = rt.builtin_class(ty);
        if let HeapData::Class(cls) = rt.heap.get_mut(class_id) {
            cls.set_attr(name, ClassAttr::Method(NativeFunction::new(name, method)));
        }
    }
}

/// Splits a method call into receiver and arguments, checking the receiver kind and
/// the argument count (not counting the receiver).
fn unpack<'a>(
    rt: &Runtime,
    args: &'a ArgValues,
    ty: Type,
    name: &str,
    min: usize,
    max: usize,
) -> RunResult<(HeapId, &'a [Value])> {
    if args.has_kwargs() {
        return Err(ExcType::no_kwargs(&format!("{}.{name}", ty.name())));
    }
    let Some((receiver, rest)) = args.args().split_first() else {
        return Err(ExcType::type_error(format!(
            "unbound method {}.{name}() needs an argument",
            ty.name()
        )));
    };
    if rt.type_of(receiver) != rt.builtin_class(ty) {
        return Err(ExcType::type_error(format!(
            "descriptor '{name}' for '{}' objects doesn't apply to a '{}' object",
            ty.name(),
            rt.type_name(receiver)
        )));
    }
    if rest.len() < min || rest.len() > max {
        let expected = if min == max {
            match min {
                0 => "no arguments".to_owned(),
                1 => "exactly one argument".to_owned(),
                n => format!("exactly {n} arguments"),
            }
        } else {
            format!("from {min} to {max} arguments")
        };
        return Err(ExcType::type_error(format!(
            "{}.{name}() takes {expected} ({} given)",
            ty.name(),
            rest.len()
        )));
    }
    let id = receiver.ref_id().ok_or_else(|| ExcType::type_error("receiver is not a heap object"))?;
    Ok((id, rest))
}

fn list_append(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let (list, rest) = unpack(rt, args, Type::List, "append", 1, 1)?;
    let item = rt.clone_value(&rest[0]);
    if let HeapData::List(items) = rt.heap.get_mut(list) {
        items.push(item);
    }
    Ok(Value::None)
}

fn list_extend(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let (list, rest) = unpack(rt, args, Type::List, "extend", 1, 1)?;
    let new_items = rt.collect_iter(&rest[0])?;
    if let HeapData::List(items) = rt.heap.get_mut(list) {
        items.extend(new_items);
    }
    Ok(Value::None)
}

fn dict_get(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let (dict, rest) = unpack(rt, args, Type::Dict, "get", 1, 2)?;
    match rt.dict_lookup(dict, &rest[0])? {
        Some(value) => Ok(value),
        None => Ok(rest.get(1).map_or(Value::None, |default| rt.clone_value(default))),
    }
}

fn dict_keys(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let (dict, _) = unpack(rt, args, Type::Dict, "keys", 0, 0)?;
    let keys: Vec<Value> = match rt.heap.get(dict) {
        HeapData::Dict(dict) => dict.entries().iter().map(|entry| entry.key.clone_with_heap(&rt.heap)).collect(),
        _ => Vec::new(),
    };
    rt.alloc_list(keys)
}

fn str_upper(rt: &mut Runtime, args: &ArgValues) -> RunResult<Value> {
    let (s, _) = unpack(rt, args, Type::Str, "upper", 0, 0)?;
    let upper = match rt.heap.get(s) {
        HeapData::Str(s) => s.to_uppercase(),
        _ => String::new(),
    };
    rt.alloc_str(&upper)
}
