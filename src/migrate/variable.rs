//! Variables

use serde_json::json;
use tracing::debug;

use super::foreign::ForeignVariable;
use super::{MigrationEngine, Scope};
use crate::dashboard::{ListVariableSpec, Sort, TextVariableSpec, Variable, VariableDisplay};
use crate::engine::SchemaEngine;
use crate::plugin::PluginDescriptor;

pub const STATIC_LIST_KIND: &str = "StaticListVariable";
pub const UNSUPPORTED_VARIABLE_VALUES: [&str; 3] = ["migration", "not", "supported"];

const CONSTANT_TYPE: &str = "constant";
const TEXTBOX_TYPE: &str = "textbox";

impl<E: SchemaEngine> MigrationEngine<E> {
    pub(super) fn migrate_variables(&self, variables: &[ForeignVariable]) -> Vec<Variable> {
        variables
            .iter()
            .map(|variable| match variable.variable_type.as_str() {
                CONSTANT_TYPE | TEXTBOX_TYPE => text_variable(variable),
                _ => self.list_variable(variable),
            })
            .collect()
    }

    fn list_variable(&self, foreign: &ForeignVariable) -> Variable {
        let mut spec = ListVariableSpec {
            name: foreign.name.clone(),
            display: Some(display(foreign)),
            default_value: foreign.current.clone(),
            allow_all_value: foreign.include_all,
            allow_multiple: foreign.multi,
            custom_all_value: Some(foreign.all_value.clone())
                .filter(|v| foreign.include_all && !v.is_empty()),
            sort: foreign.sort.and_then(Sort::from_ordinal),
            plugin: placeholder_plugin(),
        };

        match self.convert_list_plugin(foreign) {
            Some(plugin) => spec.plugin = plugin,
            None => debug!(
                variable = %foreign.name,
                foreign_type = %foreign.variable_type,
                "no variable script converts variable, using a placeholder"
            ),
        }

        Variable::ListVariable(spec)
    }

    fn convert_list_plugin(&self, foreign: &ForeignVariable) -> Option<PluginDescriptor> {
        self.scripts.variables().iter().find_map(|script| {
            match self.execute_script(&script.value, Scope::Variable, &foreign.raw) {
                Ok(plugin) => plugin,
                Err(e) => {
                    debug!(
                        variable = %foreign.name,
                        script = %script.source.display(),
                        error = %e,
                        "variable script does not apply"
                    );
                    None
                }
            }
        })
    }
}

fn text_variable(foreign: &ForeignVariable) -> Variable {
    Variable::TextVariable(TextVariableSpec {
        name: foreign.name.clone(),
        display: Some(display(foreign)),
        value: foreign.query_text().unwrap_or_default().to_string(),
        constant: foreign.variable_type == CONSTANT_TYPE,
    })
}

fn display(foreign: &ForeignVariable) -> VariableDisplay {
    VariableDisplay {
        name: Some(foreign.label.clone()).filter(|l| !l.is_empty()),
        description: Some(foreign.description.clone()).filter(|d| !d.is_empty()),
        hidden: foreign.hide > 0,
    }
}

fn placeholder_plugin() -> PluginDescriptor {
    PluginDescriptor::new(STATIC_LIST_KIND, json!({ "values": UNSUPPORTED_VARIABLE_VALUES }))
}
