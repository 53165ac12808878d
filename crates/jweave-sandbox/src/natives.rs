//! Native method registry: `(owner, name, descriptor)` to Rust closures.
//!
//! Two kinds of calls land here: methods of classes the sandbox never loads
//! (`java/lang` wrappers, `Object.<init>`, the throwable constructors) and
//! the agent runtime contract (`jweave/runtime/FlowGuard`). Instance natives
//! receive their receiver as `args[0]`; a `None` return is `void`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jweave_core::runtime;

use crate::error::{Result, VmError};
use crate::hooklog::HookLog;
use crate::value::{Obj, Payload, Value};

pub type NativeFn = Rc<dyn Fn(Vec<Value>) -> Result<Option<Value>>>;

// Guard state is thread-affine by contract: each guard object carries one
// armed flag per thread, read-and-cleared by enter and written by restore.
thread_local! {
    static GUARD_ARMED: RefCell<HashMap<usize, bool>> = RefCell::new(HashMap::new());
}

fn guard_key(receiver: &Value) -> Result<usize> {
    let obj = receiver
        .as_ref()?
        .ok_or(VmError::TypeMismatch("guard receiver"))?;
    Ok(Rc::as_ptr(&obj) as usize)
}

/// Wrapper classes with their primitive descriptor and unbox method.
const WRAPPERS: &[(&str, char, &str)] = &[
    ("java/lang/Boolean", 'Z', "booleanValue"),
    ("java/lang/Byte", 'B', "byteValue"),
    ("java/lang/Character", 'C', "charValue"),
    ("java/lang/Short", 'S', "shortValue"),
    ("java/lang/Integer", 'I', "intValue"),
    ("java/lang/Long", 'J', "longValue"),
    ("java/lang/Float", 'F', "floatValue"),
    ("java/lang/Double", 'D', "doubleValue"),
];

const THROWABLES: &[&str] = &[
    "java/lang/Object",
    "java/lang/Throwable",
    "java/lang/Exception",
    "java/lang/RuntimeException",
    "java/lang/Error",
    "java/lang/IllegalStateException",
    "java/lang/IllegalArgumentException",
];

pub struct NativeRegistry {
    table: HashMap<(String, String, String), NativeFn>,
}

impl Default for NativeRegistry {
    fn default() -> Self {
        NativeRegistry::new()
    }
}

impl NativeRegistry {
    /// A registry with the builtin contract installed: FlowGuard, wrapper
    /// boxing, and no-op constructors for the base throwable chain.
    pub fn new() -> NativeRegistry {
        let mut reg = NativeRegistry {
            table: HashMap::new(),
        };

        reg.register(
            runtime::FLOW_GUARD,
            runtime::GUARD_CREATE.0,
            runtime::GUARD_CREATE.1,
            |_args| Ok(Some(Value::Ref(Some(Obj::new(runtime::FLOW_GUARD))))),
        );
        reg.register(
            runtime::FLOW_GUARD,
            runtime::GUARD_ENTER.0,
            runtime::GUARD_ENTER.1,
            |args| {
                let key = guard_key(&args[0])?;
                let armed = GUARD_ARMED.with(|map| {
                    let mut map = map.borrow_mut();
                    let armed = map.get(&key).copied().unwrap_or(true);
                    map.insert(key, false);
                    armed
                });
                Ok(Some(Value::Int(armed as i32)))
            },
        );
        reg.register(
            runtime::FLOW_GUARD,
            runtime::GUARD_RESTORE.0,
            runtime::GUARD_RESTORE.1,
            |args| {
                let key = guard_key(&args[0])?;
                let state = args[1].as_int()? != 0;
                GUARD_ARMED.with(|map| map.borrow_mut().insert(key, state));
                Ok(None)
            },
        );

        for &(class, prim, unbox) in WRAPPERS {
            reg.register(
                class,
                "valueOf",
                &format!("({prim})L{class};"),
                move |args| {
                    Ok(Some(Value::Ref(Some(Obj::with_payload(
                        class,
                        Payload::Boxed(args[0].clone()),
                    )))))
                },
            );
            reg.register(class, unbox, &format!("(){prim}"), |args| {
                let obj = args[0]
                    .as_ref()?
                    .ok_or(VmError::TypeMismatch("boxed receiver"))?;
                let obj = obj.borrow();
                match &obj.payload {
                    Payload::Boxed(v) => Ok(Some(v.clone())),
                    _ => Err(VmError::TypeMismatch("boxed payload")),
                }
            });
        }

        for &class in THROWABLES {
            reg.register(class, "<init>", "()V", |_args| Ok(None));
            reg.register(class, "<init>", "(Ljava/lang/String;)V", |args| {
                if let Some(obj) = args[0].as_ref()? {
                    obj.borrow_mut()
                        .fields
                        .insert("message".to_string(), args[1].clone());
                }
                Ok(None)
            });
        }
        reg.register(
            "java/lang/Throwable",
            "getMessage",
            "()Ljava/lang/String;",
            |args| {
                let obj = args[0]
                    .as_ref()?
                    .ok_or(VmError::TypeMismatch("throwable receiver"))?;
                let message = obj.borrow().fields.get("message").cloned();
                Ok(Some(message.unwrap_or(Value::null())))
            },
        );

        reg
    }

    pub fn register(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        f: impl Fn(Vec<Value>) -> Result<Option<Value>> + 'static,
    ) {
        self.table.insert(
            (owner.to_string(), name.to_string(), descriptor.to_string()),
            Rc::new(f),
        );
    }

    pub fn lookup(&self, owner: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.table
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
            .cloned()
    }

    /// Every descriptor registered for `owner.name`. Lets callers resolve
    /// a call by name when the method only exists as a native.
    pub fn descriptors_for(&self, owner: &str, name: &str) -> Vec<String> {
        self.table
            .keys()
            .filter(|(o, n, _)| o == owner && n == name)
            .map(|(_, _, d)| d.clone())
            .collect()
    }

    /// Installs a recording hook: logs `name(arg, arg, ...)` and answers
    /// with a truthy/empty default for its return type, so one helper
    /// covers enablement checks, before/after hooks, and travelers.
    pub fn register_probe(&mut self, log: &HookLog, owner: &str, name: &str, descriptor: &str) {
        let log = log.clone();
        let label = name.to_string();
        let ret = descriptor
            .split_once(')')
            .map(|(_, r)| r.to_string())
            .unwrap_or_default();
        self.register(owner, name, descriptor, move |args| {
            let rendered: Vec<String> = args.iter().map(|a| a.render()).collect();
            log.record(format!("{}({})", label, rendered.join(", ")));
            Ok(match ret.as_bytes().first() {
                Some(b'V') | None => None,
                Some(b'Z') => Some(Value::Int(1)),
                Some(b'J') => Some(Value::Long(0)),
                Some(b'F') => Some(Value::Float(0.0)),
                Some(b'D') => Some(Value::Double(0.0)),
                Some(b'L') | Some(b'[') => Some(Value::null()),
                Some(_) => Some(Value::Int(0)),
            })
        });
    }
}
