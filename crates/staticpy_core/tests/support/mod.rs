//! In-memory host runtime shared by integration tests.
#![allow(dead_code)]

use staticpy_core::{
    ConfigFailure, ConfigResult, FinderError, HostLifecycle, HostRuntime, InitResult,
    ModuleSpec, PackageContextSlot, SearchPath, StaticExtensionRegistry, FINDER_MODULE,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub type MockInit = fn(&MockHost) -> Result<MockObject, MockError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl Display for MockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Debug)]
pub struct MockDefinition {
    pub name: String,
    pub base_init: Cell<Option<usize>>,
    pub exec_attrs: Vec<(String, String)>,
    pub exec_error: Option<String>,
}

impl MockDefinition {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            base_init: Cell::new(None),
            exec_attrs: vec![("__name__".to_string(), name.to_string())],
            exec_error: None,
        })
    }

    pub fn failing_exec(name: &str, message: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            base_init: Cell::new(None),
            exec_attrs: vec![],
            exec_error: Some(message.to_string()),
        })
    }
}

#[derive(Debug)]
pub struct MockModule {
    pub name: String,
    pub attrs: RefCell<BTreeMap<String, String>>,
    pub definition: Option<Rc<MockDefinition>>,
}

#[derive(Debug)]
pub enum MockValue {
    Module(MockModule),
    Definition(Rc<MockDefinition>),
    Spec(ModuleSpec),
    Text(String),
    Int(i64),
}

/// Reference-counted runtime value; identity is pointer identity.
#[derive(Debug, Clone)]
pub struct MockObject(pub Rc<MockValue>);

impl MockObject {
    pub fn module(name: &str, definition: Option<Rc<MockDefinition>>) -> Self {
        Self(Rc::new(MockValue::Module(MockModule {
            name: name.to_string(),
            attrs: RefCell::new(BTreeMap::new()),
            definition,
        })))
    }

    pub fn definition(definition: Rc<MockDefinition>) -> Self {
        Self(Rc::new(MockValue::Definition(definition)))
    }

    pub fn spec(name: &str, origin: Option<&str>) -> Self {
        Self(Rc::new(MockValue::Spec(ModuleSpec::new(
            name,
            origin.map(str::to_string),
        ))))
    }

    pub fn text(value: &str) -> Self {
        Self(Rc::new(MockValue::Text(value.to_string())))
    }

    pub fn int(value: i64) -> Self {
        Self(Rc::new(MockValue::Int(value)))
    }

    pub fn is(&self, other: &MockObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_module(&self) -> &MockModule {
        match self.0.as_ref() {
            MockValue::Module(module) => module,
            other => panic!("expected module, got {other:?}"),
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.as_module().attrs.borrow().get(name).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderBehavior {
    Succeeds,
    MissingAttribute,
    NotCallable,
    Raises,
}

#[derive(Default)]
pub struct MockState {
    pub package_context: RefCell<Option<String>>,
    pub extension_cache: RefCell<BTreeMap<String, MockObject>>,
    /// Package context observed by each init invocation.
    pub init_calls: RefCell<Vec<Option<String>>>,
    pub file_attr_fails: Cell<bool>,

    pub events: Rc<RefCell<Vec<String>>>,
    pub search_path: RefCell<Vec<PathBuf>>,
    pub search_path_at_import: RefCell<Vec<Vec<PathBuf>>>,
    pub finder: Cell<Option<FinderBehavior>>,
    pub finder_calls: Cell<usize>,
    pub search_path_error: RefCell<Option<String>>,
    pub argv: RefCell<Vec<OsString>>,
    pub read_before_argv: Cell<bool>,
    pub fail_at: RefCell<Option<(String, ConfigFailure<String>)>>,
    pub registration_error: RefCell<Option<String>>,
    pub registered: RefCell<Option<(String, StaticExtensionRegistry<MockInit>)>>,
    pub main_exit: Cell<i32>,
}

/// Cloneable handle so tests keep access after handing the host away.
#[derive(Clone, Default)]
pub struct MockHost {
    pub state: Rc<MockState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.borrow().clone()
    }

    pub fn init_call_count(&self) -> usize {
        self.state.init_calls.borrow().len()
    }

    pub fn package_context(&self) -> Option<String> {
        self.state.package_context.borrow().clone()
    }

    pub fn fail_at(&self, step: &str, failure: ConfigFailure<String>) {
        *self.state.fail_at.borrow_mut() = Some((step.to_string(), failure));
    }

    fn step(&self, event: String) -> ConfigResult<String> {
        let step_name = event.split('=').next().unwrap_or_default().to_string();
        if let Some((failing, failure)) = self.state.fail_at.borrow().as_ref() {
            if *failing == step_name {
                self.state.events.borrow_mut().push(format!("{step_name}!"));
                return Err(failure.clone());
            }
        }
        self.state.events.borrow_mut().push(event);
        Ok(())
    }
}

impl PackageContextSlot for MockHost {
    type Saved = Option<String>;

    fn swap_in(&self, name: &str) -> Option<String> {
        self.state.package_context.replace(Some(name.to_string()))
    }

    fn restore(&self, saved: Option<String>) {
        *self.state.package_context.borrow_mut() = saved;
    }
}

impl HostRuntime for MockHost {
    type Object = MockObject;
    type Definition = Rc<MockDefinition>;
    type InitFn = MockInit;
    type Error = MockError;

    fn read_spec(&self, spec: &MockObject) -> Result<ModuleSpec, MockError> {
        match spec.0.as_ref() {
            MockValue::Spec(spec) => Ok(spec.clone()),
            _ => Err(MockError("AttributeError: spec has no name".to_string())),
        }
    }

    fn find_cached_extension(&self, name: &str) -> Result<Option<MockObject>, MockError> {
        Ok(self.state.extension_cache.borrow().get(name).cloned())
    }

    fn call_init(
        &self,
        init: MockInit,
    ) -> Result<InitResult<MockObject, Rc<MockDefinition>>, MockError> {
        self.state
            .init_calls
            .borrow_mut()
            .push(self.package_context());
        let value = init(self)?;
        match value.0.as_ref() {
            MockValue::Definition(definition) => Ok(InitResult::Definition(definition.clone())),
            _ => Ok(InitResult::Legacy(value)),
        }
    }

    fn materialize(
        &self,
        definition: &Rc<MockDefinition>,
        spec: &MockObject,
    ) -> Result<MockObject, MockError> {
        let spec = self.read_spec(spec)?;
        Ok(MockObject::module(&spec.name, Some(definition.clone())))
    }

    fn set_file_attr(&self, module: &MockObject, origin: &str) -> Result<(), MockError> {
        if self.state.file_attr_fails.get() {
            return Err(MockError("AttributeError: readonly attribute".to_string()));
        }
        match module.0.as_ref() {
            MockValue::Module(module) => {
                module
                    .attrs
                    .borrow_mut()
                    .insert("__file__".to_string(), origin.to_string());
                Ok(())
            }
            _ => Err(MockError("AttributeError: cannot set __file__".to_string())),
        }
    }

    fn module_definition(&self, module: &MockObject) -> Option<Rc<MockDefinition>> {
        match module.0.as_ref() {
            MockValue::Module(module) => module.definition.clone(),
            _ => None,
        }
    }

    fn set_base_init(&self, definition: &Rc<MockDefinition>, init: MockInit) {
        definition.base_init.set(Some(init as usize));
    }

    fn cache_extension(&self, name: &str, module: &MockObject) -> Result<(), MockError> {
        self.state
            .extension_cache
            .borrow_mut()
            .insert(name.to_string(), module.clone());
        Ok(())
    }

    fn is_module(&self, value: &MockObject) -> bool {
        matches!(value.0.as_ref(), MockValue::Module(_))
    }

    fn exec_definition(
        &self,
        module: &MockObject,
        definition: &Rc<MockDefinition>,
    ) -> Result<(), MockError> {
        if let Some(message) = &definition.exec_error {
            return Err(MockError(message.clone()));
        }
        let mut attrs = module.as_module().attrs.borrow_mut();
        for (key, value) in &definition.exec_attrs {
            attrs.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn text_value(&self, value: &MockObject) -> Option<String> {
        match value.0.as_ref() {
            MockValue::Text(text) => Some(text.clone()),
            _ => None,
        }
    }
}

impl SearchPath for MockHost {
    type Error = MockError;

    fn prepend_search_path(&self, entry: &Path) -> Result<(), MockError> {
        self.state
            .search_path
            .borrow_mut()
            .insert(0, entry.to_path_buf());
        Ok(())
    }

    fn append_search_path(&self, entry: &Path) -> Result<(), MockError> {
        if let Some(message) = self.state.search_path_error.borrow().as_ref() {
            self.state.events.borrow_mut().push("append!".to_string());
            return Err(MockError(message.clone()));
        }
        self.state
            .events
            .borrow_mut()
            .push(format!("append={}", entry.display()));
        self.state.search_path.borrow_mut().push(entry.to_path_buf());
        Ok(())
    }

    fn remove_search_path(&self, entry: &Path) -> Result<(), MockError> {
        let mut path = self.state.search_path.borrow_mut();
        let index = path
            .iter()
            .position(|existing| existing == entry)
            .ok_or_else(|| MockError(format!("{} not in sys.path", entry.display())))?;
        path.remove(index);
        Ok(())
    }
}

/// Runtime configuration; logs its release.
pub struct MockConfig {
    events: Rc<RefCell<Vec<String>>>,
}

impl Drop for MockConfig {
    fn drop(&mut self) {
        self.events.borrow_mut().push("release_config".to_string());
    }
}

pub struct MockImported(pub String);

impl HostLifecycle for MockHost {
    type Config = MockConfig;
    type Status = String;
    type InitFn = MockInit;
    type Module = MockImported;

    fn new_config(&self) -> MockConfig {
        self.state.events.borrow_mut().push("new_config".to_string());
        MockConfig {
            events: self.state.events.clone(),
        }
    }

    fn argv_before_read(&self) -> bool {
        !self.state.read_before_argv.get()
    }

    fn set_program_name(&self, _config: &mut MockConfig, program: &OsStr) -> ConfigResult<String> {
        self.step(format!("program={}", program.to_string_lossy()))
    }

    fn set_argv(&self, _config: &mut MockConfig, args: &[OsString]) -> ConfigResult<String> {
        let joined = args
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        self.step(format!("argv={joined}"))?;
        *self.state.argv.borrow_mut() = args.to_vec();
        Ok(())
    }

    fn read_config(&self, _config: &mut MockConfig) -> ConfigResult<String> {
        self.step("read".to_string())
    }

    fn set_run_module(&self, _config: &mut MockConfig, module: &str) -> ConfigResult<String> {
        self.step(format!("run_module={module}"))
    }

    fn register_loader_module(
        &self,
        name: &'static str,
        registry: StaticExtensionRegistry<MockInit>,
    ) -> Result<(), MockError> {
        if let Some(message) = self.state.registration_error.borrow().as_ref() {
            return Err(MockError(message.clone()));
        }
        self.state.events.borrow_mut().push(format!("register={name}"));
        *self.state.registered.borrow_mut() = Some((name.to_string(), registry));
        Ok(())
    }

    fn initialize(&self, _config: &MockConfig) -> ConfigResult<String> {
        self.step("initialize".to_string())
    }

    fn import_module(&self, name: &str) -> Result<MockImported, MockError> {
        self.state
            .search_path_at_import
            .borrow_mut()
            .push(self.state.search_path.borrow().clone());
        if name == FINDER_MODULE && self.state.finder.get().is_some() {
            return Ok(MockImported(name.to_string()));
        }
        Err(MockError(format!(
            "ModuleNotFoundError: No module named '{name}'"
        )))
    }

    fn call_attr(
        &self,
        _module: &MockImported,
        attr: &'static str,
    ) -> Result<(), FinderError<MockError>> {
        match self.state.finder.get() {
            Some(FinderBehavior::Succeeds) => {
                self.state.finder_calls.set(self.state.finder_calls.get() + 1);
                Ok(())
            }
            Some(FinderBehavior::MissingAttribute) | None => Err(FinderError::MissingAttribute {
                attr,
                source: MockError(format!("AttributeError: {attr}")),
            }),
            Some(FinderBehavior::NotCallable) => Err(FinderError::NotCallable { attr }),
            Some(FinderBehavior::Raises) => {
                self.state.finder_calls.set(self.state.finder_calls.get() + 1);
                Err(FinderError::CallFailed {
                    attr,
                    source: MockError("RuntimeError: finder exploded".to_string()),
                })
            }
        }
    }

    fn run_main(&self) -> i32 {
        self.state.events.borrow_mut().push("run_main".to_string());
        self.state.main_exit.get()
    }

    fn exit_with_status(&self, status: String) -> ! {
        panic!("fatal configuration status: {status}")
    }
}

/// Cloneable in-memory diagnostics sink.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
