use super::function::Function;
use super::types::{DataLayout, FuncId, Signature};
use crate::error::PassError;

/// A compilation unit: the functions the pass walks, in definition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    data_layout: DataLayout,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>, data_layout: DataLayout) -> Self {
        Self {
            name: name.into(),
            data_layout,
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_layout(&self) -> DataLayout {
        self.data_layout
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn add_function(&mut self, function: Function) -> Result<FuncId, PassError> {
        if self.function_by_name(function.name()).is_some() {
            return Err(PassError::DuplicateFunction(function.name().to_string()));
        }
        self.functions.push(function);
        Ok(FuncId(self.functions.len() as u32 - 1))
    }

    /// Returns the function called `name`, declaring it first if it does not
    /// exist yet. An existing function must have exactly `signature`.
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        signature: Signature,
    ) -> Result<FuncId, PassError> {
        match self.function_by_name(name) {
            Some(id) => {
                let found = self.function(id).signature();
                if *found != signature {
                    return Err(PassError::HookSignatureMismatch {
                        name: name.to_string(),
                        expected: signature,
                        found: found.clone(),
                    });
                }
                Ok(id)
            }
            None => self.add_function(Function::new(name, signature)),
        }
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name() == name)
            .map(|index| FuncId(index as u32))
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this module.
    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn get_function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(index, f)| (FuncId(index as u32), f))
    }

    pub fn func_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }
}
