//! `$slot$` substitution for the two artifact templates
//!
//! A slot that stands alone on its line is filled block-wise: every line of
//! the fragment gets the slot's indentation, and an empty fragment removes
//! the line. Slots inside other text are replaced as they are.

use hashbrown::{HashMap, HashSet};

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    text: &'static str,
}

impl Template {
    pub const GLUE: Self = Self {
        name: "glue",
        text: include_str!("templates/peer.java.tmpl"),
    };

    pub const NATIVE: Self = Self {
        name: "native",
        text: include_str!("templates/kernel.c.tmpl"),
    };

    pub const fn new(name: &'static str, text: &'static str) -> Self {
        Self { name, text }
    }

    /// Fills every slot. Fails on a slot without a fragment and on a
    /// fragment without a slot
    pub fn render(&self, slots: &HashMap<&str, String>) -> CompileResult<String> {
        let mut used = HashSet::new();
        let mut output = String::with_capacity(self.text.len());

        for line in self.text.lines() {
            let trimmed = line.trim_start();
            let standalone = trimmed
                .strip_prefix('$')
                .and_then(|s| s.strip_suffix('$'))
                .filter(|name| is_slot_name(name));

            if let Some(name) = standalone {
                let fragment = self.fragment(slots, name)?;
                used.insert(name);

                let indent = &line[..line.len() - trimmed.len()];
                for fragment_line in fragment.lines() {
                    if !fragment_line.is_empty() {
                        output.push_str(indent);
                        output.push_str(fragment_line);
                    }
                    output.push('\n');
                }
                continue;
            }

            let mut rest = line;
            while let Some(start) = rest.find('$') {
                output.push_str(&rest[..start]);

                let after = &rest[start + 1..];
                let Some(end) = after.find('$') else {
                    return Err(self.error("unterminated slot"));
                };
                let name = &after[..end];
                if !is_slot_name(name) {
                    return Err(self.error(format!("invalid slot name `{name}`")));
                }

                output.push_str(self.fragment(slots, name)?);
                used.insert(name);
                rest = &after[end + 1..];
            }
            output.push_str(rest);
            output.push('\n');
        }

        if let Some(unknown) = slots.keys().filter(|k| !used.contains(*k)).min() {
            return Err(self.error(format!("no slot named `{unknown}`")));
        }

        Ok(output)
    }

    fn fragment<'s>(&self, slots: &'s HashMap<&str, String>, name: &str) -> CompileResult<&'s str> {
        slots
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| self.error(format!("missing slot `{name}`")))
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Template {
            template: self.name,
            message: message.into(),
        }
    }
}

fn is_slot_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const TEST: Template = Template::new(
        "test",
        indoc! {"
            class $name$ {
                $body$
                $empty$
            }
        "},
    );

    fn slots(entries: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        entries.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn indents_block_slots_and_drops_empty_ones() {
        let output = TEST
            .render(&slots(&[
                ("name", "Peer"),
                ("body", "int a;\n\nint b;"),
                ("empty", ""),
            ]))
            .unwrap();

        assert_eq!(
            output,
            indoc! {"
                class Peer {
                    int a;

                    int b;
                }
            "}
        );
    }

    #[test]
    fn rejects_missing_and_unknown_slots() {
        let error = TEST
            .render(&slots(&[("name", "Peer"), ("empty", "")]))
            .unwrap_err();
        assert_eq!(error.to_string(), "template error: `test` template: missing slot `body`");

        let error = TEST
            .render(&slots(&[
                ("name", "Peer"),
                ("body", ""),
                ("empty", ""),
                ("extra", "x"),
            ]))
            .unwrap_err();
        assert!(error.to_string().contains("no slot named `extra`"));
    }

    #[test]
    fn shipped_templates_have_well_formed_slots() {
        for template in [Template::GLUE, Template::NATIVE] {
            let error = template.render(&HashMap::new()).unwrap_err();
            assert!(error.to_string().contains("missing slot"), "{error}");
        }
    }
}
