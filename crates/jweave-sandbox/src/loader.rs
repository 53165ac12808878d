//! Class registration, weaving, and lazy linking.
//!
//! The sandbox plays the host side of the rewrite contract: every class it
//! registers is offered to a [`Weaver`] before first use, and the registered
//! bytes double as the [`ClassSource`] the weaver's resolver reads ancestor
//! shapes from. Linking is lazy and runs `<clinit>` exactly once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use jweave_classfile::{flags, ClassFile, ClassSummary};
use jweave_core::{Catalog, StatsSnapshot, Weaver};

use crate::error::{Result, VmError};
use crate::interp::{self, Dispatch};
use crate::natives::NativeRegistry;
use crate::value::{Obj, Value};

/// A linked class: parsed, woven (or passed through), all bodies decoded.
pub struct LoadedClass {
    pub file: ClassFile,
    /// True when the weaver replaced the registered bytes.
    pub woven: bool,
}

impl LoadedClass {
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.file
            .methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)
    }
}

/// JSON class-bundle manifest: `{"classes": [{"name": ..., "bytes": <base64>}]}`.
#[derive(Debug, Deserialize)]
struct BundleManifest {
    classes: Vec<BundleEntry>,
}

#[derive(Debug, Deserialize)]
struct BundleEntry {
    name: String,
    bytes: String,
}

type SharedBytes = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// A single-threaded execution scope over registered classes.
pub struct Sandbox {
    /// Bytes as registered, pre-weave. Shared with the weaver's resolver.
    raw: SharedBytes,
    weaver: Option<Weaver>,
    linked: RefCell<HashMap<String, Rc<LoadedClass>>>,
    statics: RefCell<HashMap<String, HashMap<String, Value>>>,
    natives: NativeRegistry,
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::new()
    }
}

impl Sandbox {
    /// A sandbox that executes classes exactly as registered.
    pub fn new() -> Sandbox {
        Sandbox {
            raw: Arc::new(RwLock::new(HashMap::new())),
            weaver: None,
            linked: RefCell::new(HashMap::new()),
            statics: RefCell::new(HashMap::new()),
            natives: NativeRegistry::new(),
        }
    }

    /// A sandbox that routes every registered class through a weaver built
    /// from `catalog`. The weaver resolves ancestors against whatever has
    /// been registered so far.
    pub fn with_catalog(catalog: Catalog) -> Sandbox {
        let raw: SharedBytes = Arc::new(RwLock::new(HashMap::new()));
        let source_map = raw.clone();
        let source = move |name: &str| source_map.read().get(name).cloned();
        let weaver = Weaver::new(Arc::new(catalog), Arc::new(source));
        Sandbox {
            raw,
            weaver: Some(weaver),
            linked: RefCell::new(HashMap::new()),
            statics: RefCell::new(HashMap::new()),
            natives: NativeRegistry::new(),
        }
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Weave counters, when a catalog is attached.
    pub fn weave_stats(&self) -> Option<StatsSnapshot> {
        self.weaver.as_ref().map(|w| w.stats().snapshot())
    }

    /// Registers one class definition. The name comes from the bytes
    /// themselves; weaving and linking happen on first use.
    pub fn define_class(&self, bytes: Vec<u8>) -> Result<String> {
        let summary = ClassSummary::parse(&bytes)?;
        let name = summary.name;
        if self.linked.borrow().contains_key(&name) {
            return Err(VmError::Unsupported(format!("{name} is already linked")));
        }
        debug!(class = %name, size = bytes.len(), "class registered");
        self.raw.write().insert(name.clone(), bytes);
        Ok(name)
    }

    /// Registers every class in a JSON bundle manifest. Entry names must
    /// match the names baked into the class bytes.
    pub fn load_bundle(&self, manifest: &str) -> Result<Vec<String>> {
        use base64::Engine;

        let bundle: BundleManifest =
            serde_json::from_str(manifest).map_err(|e| VmError::Bundle(e.to_string()))?;
        let mut names = Vec::with_capacity(bundle.classes.len());
        for entry in bundle.classes {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&entry.bytes)
                .map_err(|e| VmError::Bundle(format!("{}: {e}", entry.name)))?;
            let defined = self.define_class(bytes)?;
            if defined != entry.name {
                return Err(VmError::Bundle(format!(
                    "manifest says {} but bytes define {defined}",
                    entry.name
                )));
            }
            names.push(defined);
        }
        Ok(names)
    }

    /// The linked form of `name`, linking it now if this is first use.
    /// `Ok(None)` means the name was never registered.
    pub fn class(&self, name: &str) -> Result<Option<Rc<LoadedClass>>> {
        if let Some(class) = self.linked.borrow().get(name) {
            return Ok(Some(class.clone()));
        }
        let bytes = match self.raw.read().get(name) {
            Some(b) => b.clone(),
            None => return Ok(None),
        };
        Ok(Some(self.link(name, bytes)?))
    }

    fn link(&self, name: &str, original: Vec<u8>) -> Result<Rc<LoadedClass>> {
        let (bytes, woven) = match &self.weaver {
            Some(weaver) => match weaver.rewrite(Some(name), &original) {
                Some(replacement) => (replacement, true),
                None => (original, false),
            },
            None => (original, false),
        };
        let mut file = ClassFile::parse(&bytes)?;
        for i in 0..file.methods.len() {
            if file.methods[i].body.is_some() {
                file.decode_method_body(i)?;
            }
        }

        let mut statics = HashMap::new();
        for field in &file.fields {
            if field.access_flags & flags::ACC_STATIC != 0 {
                statics.insert(field.name.clone(), Value::default_of(&field.descriptor));
            }
        }
        self.statics.borrow_mut().insert(name.to_string(), statics);

        let class = Rc::new(LoadedClass { file, woven });
        // Visible before <clinit> so self-referential initializers resolve.
        self.linked
            .borrow_mut()
            .insert(name.to_string(), class.clone());
        debug!(class = %name, woven, "linked");

        if let Some(index) = class.find_method("<clinit>", "()V") {
            interp::run_method(self, &class, index, Vec::new(), 0)?;
        }
        Ok(class)
    }

    /// Invokes a static method, resolving the descriptor by name. Fails on
    /// overloads; callers with overloaded fixtures pass the descriptor via
    /// [`Sandbox::call_static_with`].
    pub fn call_static(&self, class: &str, method: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let descriptor = self.unique_descriptor(class, method)?;
        self.call_static_with(class, method, &descriptor, args)
    }

    pub fn call_static_with(
        &self,
        class: &str,
        method: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        interp::call_resolved(self, class, method, descriptor, args, 0, Dispatch::Static)
    }

    /// Allocates an instance and runs the matching constructor.
    pub fn instantiate(&self, class: &str, descriptor: &str, args: Vec<Value>) -> Result<Value> {
        if self.class(class)?.is_none() {
            return Err(VmError::ClassNotFound(class.to_string()));
        }
        let obj = Obj::new(class);
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(Value::Ref(Some(obj.clone())));
        full_args.extend(args);
        interp::call_resolved(self, class, "<init>", descriptor, full_args, 0, Dispatch::Special)?;
        Ok(Value::Ref(Some(obj)))
    }

    /// Virtual dispatch on the receiver's runtime class, descriptor
    /// resolved by name.
    pub fn call_virtual(
        &self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let obj = receiver
            .as_ref()?
            .ok_or(VmError::TypeMismatch("null receiver"))?;
        let class = obj.borrow().class.clone();
        let descriptor = self.unique_descriptor(&class, method)?;
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(receiver.clone());
        full_args.extend(args);
        interp::call_resolved(self, &class, method, &descriptor, full_args, 0, Dispatch::Virtual)
    }

    /// The lone descriptor for `method` along `class`'s chain, checking
    /// registered classes first and the native registry after.
    fn unique_descriptor(&self, class: &str, method: &str) -> Result<String> {
        let mut found: Vec<String> = Vec::new();
        let mut chain: Vec<String> = Vec::new();
        let mut current = Some(class.to_string());
        while let Some(class_name) = current {
            chain.push(class_name.clone());
            let Some(loaded) = self.class(&class_name)? else {
                let mut tail = interp::builtin_super(&class_name);
                while let Some(t) = tail {
                    chain.push(t.to_string());
                    tail = interp::builtin_super(t);
                }
                break;
            };
            for m in &loaded.file.methods {
                if m.name == method && !found.contains(&m.descriptor) {
                    found.push(m.descriptor.clone());
                }
            }
            current = loaded.file.super_name.clone();
        }
        if found.is_empty() {
            for class_name in &chain {
                for d in self.natives.descriptors_for(class_name, method) {
                    if !found.contains(&d) {
                        found.push(d);
                    }
                }
            }
        }
        match found.len() {
            0 => Err(VmError::MethodNotFound {
                owner: class.to_string(),
                name: method.to_string(),
                descriptor: "*".to_string(),
            }),
            1 => Ok(found.remove(0)),
            _ => Err(VmError::Unsupported(format!(
                "{class}.{method} is overloaded; pass a descriptor"
            ))),
        }
    }

    pub(crate) fn get_static(&self, owner: &str, name: &str) -> Result<Value> {
        let mut current = Some(owner.to_string());
        while let Some(class_name) = current {
            let Some(loaded) = self.class(&class_name)? else {
                break;
            };
            if let Some(v) = self
                .statics
                .borrow()
                .get(&class_name)
                .and_then(|m| m.get(name))
            {
                return Ok(v.clone());
            }
            current = loaded.file.super_name.clone();
        }
        Err(VmError::Unsupported(format!("static field {owner}.{name}")))
    }

    pub(crate) fn set_static(&self, owner: &str, name: &str, value: Value) -> Result<()> {
        let mut current = Some(owner.to_string());
        while let Some(class_name) = current {
            let Some(loaded) = self.class(&class_name)? else {
                break;
            };
            let mut statics = self.statics.borrow_mut();
            if let Some(map) = statics.get_mut(&class_name) {
                if map.contains_key(name) {
                    map.insert(name.to_string(), value);
                    return Ok(());
                }
            }
            drop(statics);
            current = loaded.file.super_name.clone();
        }
        Err(VmError::Unsupported(format!("static field {owner}.{name}")))
    }
}
