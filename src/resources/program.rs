//! Compiled programs and the per-renderer program cache.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crate::{
    data_structures::material::Material,
    gpu::{GraphicsApi, ProgramHandle, ProgramReflection, ProgramSource, UniformLocation, UniformValue},
    pipelines::shader::ProgramDefines,
};

type FirstUse = Box<dyn FnOnce(&mut dyn GraphicsApi, &Program)>;

/// A linked shader pair.
///
/// A program whose compile or link failed keeps its diagnostic and no handle;
/// it is never retried and primitives bound to it are skipped.
pub struct Program {
    key: String,
    handle: Option<ProgramHandle>,
    diagnostic: Option<String>,
    reflection: ProgramReflection,
    first_use: RefCell<Option<FirstUse>>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("key", &self.key)
            .field("handle", &self.handle)
            .field("diagnostic", &self.diagnostic)
            .finish()
    }
}

impl Program {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    pub fn is_usable(&self) -> bool {
        self.handle.is_some()
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.reflection.attributes.get(name).copied()
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.reflection.uniforms.get(name).copied()
    }

    /// Registers work to run the first time the program is bound.
    pub fn on_first_use(&self, callback: FirstUse) {
        *self.first_use.borrow_mut() = Some(callback);
    }

    /// Binds the program, running the first-use callback if still pending.
    pub(crate) fn use_program(&self, api: &mut dyn GraphicsApi) {
        let Some(handle) = self.handle else { return };
        api.use_program(handle);
        let first_use = self.first_use.borrow_mut().take();
        if let Some(callback) = first_use {
            callback(api, self);
        }
    }

    pub(crate) fn set_uniform(&self, api: &mut dyn GraphicsApi, name: &str, value: &UniformValue) {
        if let Some(location) = self.uniform_location(name) {
            api.set_uniform(location, value);
        }
    }
}

/// Programs keyed by material name plus serialized defines, owned by one
/// renderer for its lifetime.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<String, Rc<Program>>,
}

impl ProgramCache {
    pub fn cache_key(material: &Material, defines: &ProgramDefines) -> String {
        format!("{}{}", material.name(), defines.serialize())
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Rc<Program>> {
        self.programs.get(key).cloned()
    }

    /// Looks the program up, compiling, linking and reflecting it on a miss.
    ///
    /// The first-use callback binds each sampler slot to the texture unit
    /// matching its position in the material, which holds for the program's
    /// lifetime.
    pub fn get_or_create(
        &mut self,
        api: &mut dyn GraphicsApi,
        material: &Material,
        defines: &ProgramDefines,
    ) -> Rc<Program> {
        let key = Self::cache_key(material, defines);
        if let Some(program) = self.programs.get(&key) {
            return program.clone();
        }

        let source = ProgramSource {
            label: material.name(),
            vertex: material.vertex_source(),
            fragment: material.fragment_source(),
            defines,
        };
        let program = match api.create_program(source) {
            Ok((handle, reflection)) => {
                log::debug!("compiled program `{}`", key);
                Program {
                    key: key.clone(),
                    handle: Some(handle),
                    diagnostic: None,
                    reflection,
                    first_use: RefCell::new(None),
                }
            }
            Err(e) => {
                log::error!("program `{}` failed to build: {:#}", key, e);
                Program {
                    key: key.clone(),
                    handle: None,
                    diagnostic: Some(format!("{e:#}")),
                    reflection: ProgramReflection::default(),
                    first_use: RefCell::new(None),
                }
            }
        };

        if program.is_usable() {
            let samplers: Vec<String> = material.samplers().iter().map(|s| s.name.clone()).collect();
            program.on_first_use(Box::new(move |api, program| {
                for (unit, name) in samplers.iter().enumerate() {
                    program.set_uniform(api, name, &UniformValue::Int(unit as i32));
                }
            }));
        }

        let program = Rc::new(program);
        self.programs.insert(key, program.clone());
        program
    }
}
