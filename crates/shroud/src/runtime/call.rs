//! Calling functions, bound methods, classes and callable instances.

use super::Runtime;
use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{DropWithHeap, HeapData, HeapId},
    types::Type,
    value::Value,
};

impl Runtime {
    /// `callable(*args, **kwargs)`.
    pub fn call(&mut self, callable: &Value, args: &ArgValues) -> RunResult<Value> {
        self.nested(|rt| rt.call_inner(callable, args))
    }

    fn call_inner(&mut self, callable: &Value, args: &ArgValues) -> RunResult<Value> {
        let Some(id) = callable.ref_id() else {
            return Err(ExcType::not_callable(&self.type_name(callable)));
        };
        match self.heap.get(id) {
            HeapData::Function(function) => {
                let function = function.clone();
                function.call(self, args)
            }
            HeapData::BoundMethod(method) => {
                let function = method.function().clone();
                let call_args = args.prepend_cloned(method.receiver(), &self.heap);
                let result = function.call(self, &call_args);
                call_args.drop_with_heap(&mut self.heap);
                result
            }
            HeapData::Class(_) => self.call_class(id, args),
            HeapData::Proxy(_) => self.proxy_call(callable, args),
            HeapData::Instance(instance) => match self.lookup_method(instance.class_id(), "__call__") {
                Some(function) => {
                    let call_args = args.prepend_cloned(callable, &self.heap);
                    let result = function.call(self, &call_args);
                    call_args.drop_with_heap(&mut self.heap);
                    result
                }
                None => Err(ExcType::not_callable(&self.type_name(callable))),
            },
            _ => Err(ExcType::not_callable(&self.type_name(callable))),
        }
    }

    /// Instantiates a class: proxy kinds build a proxy, builtins convert their argument,
    /// user classes create an instance and run `__init__`.
    pub fn call_class(&mut self, class_id: HeapId, args: &ArgValues) -> RunResult<Value> {
        let Some(cls) = self.class_object(class_id) else {
            return Err(ExcType::type_error("call_class() needs a class"));
        };
        if cls.is_proxy_kind() {
            return self.construct_proxy(class_id, args);
        }
        if cls.module() == "builtins" {
            let name = cls.name().to_owned();
            if let Ok(ty) = name.parse::<Type>()
                && class_id == self.builtin_class(ty)
            {
                return self.construct_builtin(ty, args);
            }
        }

        let instance = self.new_instance(class_id)?;
        let result = match self.lookup_method(class_id, "__init__") {
            Some(init) => {
                let init_args = args.prepend_cloned(&instance, &self.heap);
                let result = init.call(self, &init_args);
                init_args.drop_with_heap(&mut self.heap);
                match result {
                    Ok(Value::None) => Ok(()),
                    Ok(other) => {
                        let type_name = self.type_name(&other);
                        self.release(other);
                        Err(ExcType::type_error(format!(
                            "__init__() should return None, not '{type_name}'"
                        )))
                    }
                    Err(err) => Err(err),
                }
            }
            None if !args.args().is_empty() || args.has_kwargs() => Err(ExcType::type_error(format!(
                "{}() takes no arguments",
                self.class_name(class_id)
            ))),
            None => Ok(()),
        };
        match result {
            Ok(()) => Ok(instance),
            Err(err) => {
                self.release(instance);
                Err(err)
            }
        }
    }

    fn construct_builtin(&mut self, ty: Type, args: &ArgValues) -> RunResult<Value> {
        let name = ty.name();
        match ty {
            Type::Object => {
                args.positional(name, 0, 0)?;
                self.new_instance(self.builtin_class(Type::Object))
            }
            Type::Int => match args.positional(name, 0, 1)? {
                [] => Ok(Value::Int(0)),
                [value, ..] => self.to_int(value).map(Value::Int),
            },
            Type::Float => match args.positional(name, 0, 1)? {
                [] => Ok(Value::Float(0.0)),
                [value, ..] => self.to_float(value).map(Value::Float),
            },
            Type::Bool => match args.positional(name, 0, 1)? {
                [] => Ok(Value::Bool(false)),
                [value, ..] => self.is_true(value).map(Value::Bool),
            },
            Type::Str => match args.positional(name, 0, 1)? {
                [] => self.alloc_str(""),
                [value, ..] => {
                    let s = self.to_str(value)?;
                    self.alloc_str(&s)
                }
            },
            Type::List => match args.positional(name, 0, 1)? {
                [] => self.alloc_list(Vec::new()),
                [value, ..] => {
                    let items = self.collect_iter(value)?;
                    self.alloc_list(items)
                }
            },
            Type::Tuple => match args.positional(name, 0, 1)? {
                [] => self.alloc_tuple(Vec::new()),
                [value, ..] => {
                    let items = self.collect_iter(value)?;
                    self.alloc_tuple(items)
                }
            },
            Type::Dict => match args.positional(name, 0, 1)? {
                [] => self.alloc_dict(Vec::new()),
                [value, ..] => {
                    let keys = self.collect_iter(value)?;
                    let mut pairs = Vec::with_capacity(keys.len());
                    let mut failure = None;
                    for key in keys {
                        if failure.is_some() {
                            self.release(key);
                            continue;
                        }
                        match self.getitem(value, &key) {
                            Ok(item) => pairs.push((key, item)),
                            Err(err) => {
                                self.release(key);
                                failure = Some(err);
                            }
                        }
                    }
                    if let Some(err) = failure {
                        pairs.drop_with_heap(&mut self.heap);
                        return Err(err);
                    }
                    self.alloc_dict(pairs)
                }
            },
            Type::Type
            | Type::NoneType
            | Type::NotImplementedType
            | Type::Function
            | Type::Method
            | Type::Iterator => Err(ExcType::type_error(format!("cannot create '{name}' instances"))),
        }
    }
}
