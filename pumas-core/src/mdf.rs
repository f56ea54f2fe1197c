//! Materials Description File (MDF) parser: a three-level hierarchical text
//! document under a root `pumas` tag (spec §6). This is a small
//! hand-rolled tag/attribute scanner rather than a general XML parser,
//! since the grammar is fixed and shallow.

use crate::error::{Error, Result};
use crate::material::{AtomicElement, BaseMaterial, CompositeMaterial, MaterialComponent};
use std::collections::HashMap;

/// One parsed `component` entry: `{name, fraction}`.
struct ComponentSpec {
    name: String,
    fraction: f64,
}

/// One parsed base-material entry, before element/index resolution.
struct BaseSpec {
    name: String,
    file: Option<String>,
    density_g_cm3: f64,
    mean_excitation_ev: Option<f64>,
    components: Vec<ComponentSpec>,
}

/// One parsed composite-material entry, before base-material resolution.
struct CompositeSpec {
    name: String,
    components: Vec<ComponentSpec>,
}

/// The fully parsed, but not yet numerically resolved, MDF contents.
pub struct MdfDocument {
    /// Declared elements, in file order.
    pub elements: Vec<AtomicElement>,
    /// Declared base materials, in file order.
    pub bases: Vec<BaseMaterial>,
    /// Base-material stopping-power file paths, parallel to `bases`.
    pub base_files: Vec<String>,
    /// Declared composite materials, in file order.
    pub composites: Vec<CompositeMaterial>,
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 4..];
        match after.find("-->") {
            Some(end) => rest = &after[end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

enum Tag<'a> {
    Open { name: &'a str, attrs: HashMap<String, String>, self_closing: bool },
    Close { name: &'a str },
}

fn parse_attrs(s: &str) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| Error::format(format!("malformed attribute in `{s}`")))?;
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();
        let quote = rest
            .chars()
            .next()
            .ok_or_else(|| Error::format(format!("malformed attribute in `{s}`")))?;
        if quote != '"' && quote != '\'' {
            return Err(Error::format(format!("missing attribute quote in `{s}`")));
        }
        let close = rest[1..]
            .find(quote)
            .ok_or_else(|| Error::format(format!("unterminated attribute value in `{s}`")))?;
        let value = rest[1..1 + close].to_string();
        attrs.insert(key, value);
        rest = rest[1 + close + 1..].trim_start();
    }
    Ok(attrs)
}

fn next_tag(s: &str) -> Result<Option<(Tag<'_>, &str)>> {
    let Some(lt) = s.find('<') else { return Ok(None) };
    let after = &s[lt + 1..];
    let gt = after
        .find('>')
        .ok_or_else(|| Error::format("unterminated tag (missing `>`)".into()))?;
    let body = &after[..gt];
    let rest = &after[gt + 1..];

    if let Some(name) = body.strip_prefix('/') {
        return Ok(Some((Tag::Close { name: name.trim() }, rest)));
    }

    let self_closing = body.trim_end().ends_with('/');
    let trimmed = if self_closing { &body[..body.trim_end().len() - 1] } else { body };
    let name_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let name = trimmed[..name_end].trim();
    let attrs = parse_attrs(&trimmed[name_end..])?;

    Ok(Some((Tag::Open { name, attrs, self_closing }, rest)))
}

fn attr<'a>(attrs: &'a HashMap<String, String>, tag: &str, key: &str) -> Result<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::format(format!("`{tag}` tag missing required attribute `{key}`")))
}

fn snake_case(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Parses MDF `text` into an unresolved [`MdfDocument`].
///
/// # Errors
///
/// Returns [`Error::Format`] for unknown/unmatched tags, missing required
/// attributes, or unknown element/material references.
pub fn parse(text: &str) -> Result<MdfDocument> {
    let text = strip_comments(text);
    let mut rest: &str = &text;

    let mut saw_root = false;
    let mut element_specs: Vec<(String, u32, f64, f64)> = Vec::new();
    let mut base_specs: Vec<BaseSpec> = Vec::new();
    let mut composite_specs: Vec<CompositeSpec> = Vec::new();

    // simple stack-based descent: pumas -> {element | material | composite
    // -> component}*
    #[derive(PartialEq)]
    enum State {
        TopLevel,
        InBase(usize),
        InComposite(usize),
    }
    let mut state = State::TopLevel;

    while let Some((tag, next)) = next_tag(rest)? {
        rest = next;
        match tag {
            Tag::Open { name: "pumas", self_closing, .. } => {
                if self_closing {
                    return Err(Error::format("`pumas` root tag cannot be self-closing".into()));
                }
                if saw_root {
                    return Err(Error::format("duplicate `pumas` root tag".into()));
                }
                saw_root = true;
            }
            Tag::Open { name: "element", attrs, .. } if state == State::TopLevel => {
                let name = attr(&attrs, "element", "name")?.to_string();
                let z: u32 = attr(&attrs, "element", "Z")?
                    .parse()
                    .map_err(|_| Error::format("`element` Z must be an integer".into()))?;
                let a: f64 = attr(&attrs, "element", "A")?
                    .parse()
                    .map_err(|_| Error::format("`element` A must be a number".into()))?;
                let i_ev: f64 = attr(&attrs, "element", "I")?
                    .parse()
                    .map_err(|_| Error::format("`element` I must be a number".into()))?;
                element_specs.push((name, z, a, i_ev));
            }
            Tag::Open { name: "material", attrs, self_closing, .. } if state == State::TopLevel => {
                let name = attr(&attrs, "material", "name")?.to_string();
                let density: f64 = attr(&attrs, "material", "density")?
                    .parse()
                    .map_err(|_| Error::format("`material` density must be a number".into()))?;
                let file = attrs.get("file").cloned().unwrap_or_else(|| format!("{}.txt", snake_case(&name)));
                let mean_excitation_ev = attrs.get("I").map(|s| s.parse()).transpose().map_err(|_| {
                    Error::format("`material` I must be a number".into())
                })?;
                base_specs.push(BaseSpec { name, file: Some(file), density_g_cm3: density, mean_excitation_ev, components: Vec::new() });
                if !self_closing {
                    state = State::InBase(base_specs.len() - 1);
                }
            }
            Tag::Open { name: "composite", attrs, self_closing, .. } if state == State::TopLevel => {
                let name = attr(&attrs, "composite", "name")?.to_string();
                composite_specs.push(CompositeSpec { name, components: Vec::new() });
                if !self_closing {
                    state = State::InComposite(composite_specs.len() - 1);
                }
            }
            Tag::Open { name: "component", attrs, .. } => {
                let name = attr(&attrs, "component", "name")?.to_string();
                let fraction: f64 = attr(&attrs, "component", "fraction")?
                    .parse()
                    .map_err(|_| Error::format("`component` fraction must be a number".into()))?;
                match state {
                    State::InBase(i) => base_specs[i].components.push(ComponentSpec { name, fraction }),
                    State::InComposite(i) => composite_specs[i].components.push(ComponentSpec { name, fraction }),
                    State::TopLevel => return Err(Error::format("`component` outside of a material/composite".into())),
                }
            }
            Tag::Open { name, .. } => return Err(Error::format(format!("unknown tag `{name}`"))),
            Tag::Close { name: "material" } => {
                if !matches!(state, State::InBase(_)) {
                    return Err(Error::format("unmatched `</material>`".into()));
                }
                state = State::TopLevel;
            }
            Tag::Close { name: "composite" } => {
                if !matches!(state, State::InComposite(_)) {
                    return Err(Error::format("unmatched `</composite>`".into()));
                }
                state = State::TopLevel;
            }
            Tag::Close { name: "pumas" } => {}
            Tag::Close { name } => return Err(Error::format(format!("unmatched closing tag `</{name}>`"))),
        }
    }

    if !saw_root {
        return Err(Error::format("missing `pumas` root tag".into()));
    }

    let elements: Vec<AtomicElement> = element_specs
        .into_iter()
        .enumerate()
        .map(|(i, (name, z, a, i_ev))| AtomicElement::new(name, z, a, i_ev, i))
        .collect::<Result<_>>()?;

    let find_element = |name: &str| -> Result<usize> {
        elements
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| Error::format(format!("unknown element reference `{name}`")))
    };

    let mut bases = Vec::with_capacity(base_specs.len());
    let mut base_files = Vec::with_capacity(base_specs.len());
    let mut base_names = Vec::with_capacity(base_specs.len());
    for spec in &base_specs {
        let mut components = Vec::with_capacity(spec.components.len());
        for c in &spec.components {
            components.push(MaterialComponent { element: find_element(&c.name)?, fraction: c.fraction });
        }
        let mean_excitation = spec.mean_excitation_ev.map(|ev: f64| ev * 1e-9);
        bases.push(BaseMaterial::new(spec.name.clone(), components, spec.density_g_cm3 * 1000.0, mean_excitation, &elements)?);
        base_files.push(spec.file.clone().unwrap());
        base_names.push(spec.name.clone());
    }

    let find_base = |name: &str| -> Result<usize> {
        base_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::format(format!("unknown base-material reference `{name}`")))
    };

    let mut composites = Vec::with_capacity(composite_specs.len());
    for spec in &composite_specs {
        let mut components = Vec::with_capacity(spec.components.len());
        for c in &spec.components {
            components.push((find_base(&c.name)?, c.fraction));
        }
        composites.push(CompositeMaterial::new(spec.name.clone(), components, &bases)?);
    }

    Ok(MdfDocument { elements, bases, base_files, composites })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let text = r#"
            <pumas>
                <!-- elements -->
                <element name="H" Z="1" A="1.008" I="19.2"/>
                <element name="O" Z="8" A="15.999" I="95.0"/>
                <material name="water" density="1.0">
                    <component name="H" fraction="0.111894"/>
                    <component name="O" fraction="0.888106"/>
                </material>
                <composite name="wet-rock">
                    <component name="water" fraction="1.0"/>
                </composite>
            </pumas>
        "#;
        let doc = parse(text).unwrap();
        assert_eq!(doc.elements.len(), 2);
        assert_eq!(doc.bases.len(), 1);
        assert_eq!(doc.base_files[0], "water.txt");
        assert_eq!(doc.composites.len(), 1);
    }

    #[test]
    fn rejects_unknown_tag() {
        let text = r#"<pumas><bogus/></pumas>"#;
        assert!(parse(text).is_err());
    }

    #[test]
    fn rejects_unknown_element_reference() {
        let text = r#"
            <pumas>
                <element name="H" Z="1" A="1.008" I="19.2"/>
                <material name="bad" density="1.0">
                    <component name="Unobtainium" fraction="1.0"/>
                </material>
            </pumas>
        "#;
        assert!(parse(text).is_err());
    }
}
