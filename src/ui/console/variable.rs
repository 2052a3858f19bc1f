use crate::debugger::Variable;
use crate::ui::console::print::style::TypeView;
use itertools::Itertools;

/// Render variables one per line, compound ones are marked with their reference.
pub fn render_variables(variables: &[Variable]) -> String {
    variables.iter().map(render_variable).join("\n")
}

pub fn render_variable(var: &Variable) -> String {
    let expand = if var.reference != 0 {
        format!(" [expand {}]", var.reference)
    } else {
        String::new()
    };
    format!(
        "{} {} = {}{expand}",
        TypeView::from(&var.type_name),
        var.name,
        var.value
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_variables() {
        let vars = vec![
            Variable {
                name: "count".to_string(),
                value: "3".to_string(),
                type_name: "int".to_string(),
                reference: 0,
            },
            Variable {
                name: "origin".to_string(),
                value: "{x = 1, y = 2}".to_string(),
                type_name: "Point".to_string(),
                reference: 4,
            },
        ];
        assert_eq!(
            render_variables(&vars),
            "int count = 3\nPoint origin = {x = 1, y = 2} [expand 4]"
        );
    }
}
