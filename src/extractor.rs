//! Extracción del modelo estructural (clases, interfaces, funciones y llamadas)
//! a partir de ficheros TypeScript/JavaScript usando tree-sitter.
//!
//! Sólo se recorren declaraciones de primer nivel, incluidas las envueltas en
//! `export` / `export default`. Un fichero que no se puede analizar se omite y se
//! informa en [`Extraction::skipped`]; el resto del lote continúa.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

use crate::models::{
    ClassModel, Extraction, FunctionModel, InterfaceModel, PropertyModel, SkippedFile,
    SourceFile, SourceInput, VIRTUAL_ROOT,
};

/// Gramáticas soportadas por el extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    TypeScript,
    Tsx,
    JavaScript,
}

impl SourceLanguage {
    /// Detecta la gramática a partir de la extensión del nombre del fichero.
    pub fn from_path(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// Estrategia para obtener los destinos de llamada dentro de una función.
///
/// La implementación por defecto es léxica; un resolvedor con información de
/// tipos puede sustituirla sin tocar los proyectores.
pub trait CallExtractor: Send + Sync {
    fn callees(&self, scope: Node<'_>, source: &[u8]) -> Vec<String>;
}

/// Heurística léxica: recorre todas las `call_expression` descendientes (bloques
/// anidados, condicionales, closures) y se queda con el identificador del
/// destino cuando es un nombre simple o termina en un segmento con nombre
/// (`a.b.c()` → `c`). Cualquier otra forma de destino se descarta.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalCallExtractor;

impl CallExtractor for LexicalCallExtractor {
    fn callees(&self, scope: Node<'_>, source: &[u8]) -> Vec<String> {
        let mut calls = Vec::new();
        let mut cursor = scope.walk();

        'walk: loop {
            let node = cursor.node();
            if node.kind() == "call_expression" {
                if let Some(name) = node
                    .child_by_field_name("function")
                    .and_then(|callee| callee_name(callee, source))
                {
                    calls.push(name);
                }
            }

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.node().id() == scope.id() {
                    break 'walk;
                }
                if cursor.goto_next_sibling() {
                    continue 'walk;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        calls
    }
}

fn callee_name(callee: Node<'_>, source: &[u8]) -> Option<String> {
    match callee.kind() {
        "identifier" => node_text(callee, source),
        "member_expression" => callee
            .child_by_field_name("property")
            .and_then(|property| node_text(property, source)),
        _ => None,
    }
}

/// Extractor del modelo estructural.
#[derive(Clone)]
pub struct SourceModelExtractor {
    calls: Arc<dyn CallExtractor>,
}

impl Default for SourceModelExtractor {
    fn default() -> Self {
        Self::with_call_extractor(Arc::new(LexicalCallExtractor))
    }
}

impl SourceModelExtractor {
    pub fn with_call_extractor(calls: Arc<dyn CallExtractor>) -> Self {
        Self { calls }
    }

    /// Extrae un modelo por fichero, en el orden de entrada. Los ficheros que
    /// no se pueden analizar se omiten (se registran y se devuelven aparte).
    pub fn extract(&self, inputs: &[SourceInput]) -> Extraction {
        let mut extraction = Extraction::default();

        for input in inputs {
            match self.extract_file(input) {
                Ok(file) => extraction.files.push(file),
                Err(err) => {
                    warn!("Omitiendo {} en la extracción estructural: {}", input.name, err);
                    extraction.skipped.push(SkippedFile {
                        name: input.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(
            "Extracción completada: {} ficheros modelados, {} omitidos",
            extraction.files.len(),
            extraction.skipped.len()
        );
        extraction
    }

    pub fn extract_file(&self, input: &SourceInput) -> Result<SourceFile> {
        let language = SourceLanguage::from_path(&input.name).ok_or_else(|| {
            anyhow!("extensión no soportada para el análisis estructural: {}", input.name)
        })?;

        let mut parser = Parser::new();
        parser
            .set_language(&language.grammar())
            .map_err(|e| anyhow!("no se pudo cargar la gramática {:?}: {}", language, e))?;

        let tree = parser
            .parse(&input.content, None)
            .ok_or_else(|| anyhow!("tree-sitter no devolvió ningún árbol para {}", input.name))?;
        let root = tree.root_node();
        if root.has_error() {
            debug!("{} contiene errores de sintaxis; el modelo será parcial", input.name);
        }

        let mut file = SourceFile {
            file_path: format!("{VIRTUAL_ROOT}{}", input.name.trim_start_matches('/')),
            ..SourceFile::default()
        };
        let source = input.content.as_bytes();

        let mut cursor = root.walk();
        for statement in root.named_children(&mut cursor) {
            self.visit_top_level(statement, source, &mut file);
        }

        Ok(file)
    }

    fn visit_top_level(&self, node: Node<'_>, source: &[u8], file: &mut SourceFile) {
        match node.kind() {
            "export_statement" => {
                if let Some(declaration) = node.child_by_field_name("declaration") {
                    self.visit_top_level(declaration, source, file);
                } else if let Some(value) = node.child_by_field_name("value") {
                    // export default de una expresión: sólo cuentan clases y funciones
                    match value.kind() {
                        "class" => file.classes.push(class_model(value, source)),
                        "function_expression" | "function" | "generator_function" => {
                            file.functions.push(self.function_model(value, source))
                        }
                        _ => {}
                    }
                }
            }
            "ambient_declaration" => {
                let mut cursor = node.walk();
                for inner in node.named_children(&mut cursor) {
                    self.visit_top_level(inner, source, file);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                file.functions.push(self.function_model(node, source));
            }
            "class_declaration" | "abstract_class_declaration" => {
                file.classes.push(class_model(node, source));
            }
            "interface_declaration" => {
                if let Some(interface) = interface_model(node, source) {
                    file.interfaces.push(interface);
                }
            }
            _ => {}
        }
    }

    fn function_model(&self, node: Node<'_>, source: &[u8]) -> FunctionModel {
        FunctionModel {
            name: node
                .child_by_field_name("name")
                .and_then(|name| node_text(name, source)),
            calls: self.calls.callees(node, source),
        }
    }
}

fn class_model(node: Node<'_>, source: &[u8]) -> ClassModel {
    let mut class = ClassModel {
        name: node
            .child_by_field_name("name")
            .and_then(|name| node_text(name, source)),
        ..ClassModel::default()
    };

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "class_heritage" {
            read_heritage(child, source, &mut class);
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return class;
    };

    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "method_definition" => {
                if is_accessor(member) {
                    continue;
                }
                if let Some(name) = member
                    .child_by_field_name("name")
                    .and_then(|name| node_text(name, source))
                {
                    if name != "constructor" {
                        class.methods.push(name);
                    }
                }
            }
            "abstract_method_signature" => {
                if let Some(name) = member
                    .child_by_field_name("name")
                    .and_then(|name| node_text(name, source))
                {
                    class.methods.push(name);
                }
            }
            // TypeScript usa `public_field_definition` (campo `name`);
            // JavaScript usa `field_definition` (campo `property`).
            "public_field_definition" | "field_definition" => {
                let name = member
                    .child_by_field_name("name")
                    .or_else(|| member.child_by_field_name("property"))
                    .and_then(|name| node_text(name, source));
                if let Some(name) = name {
                    class.properties.push(PropertyModel {
                        name,
                        type_text: property_type(member, source),
                    });
                }
            }
            _ => {}
        }
    }

    class
}

fn read_heritage(heritage: Node<'_>, source: &[u8], class: &mut ClassModel) {
    let mut structured = false;
    let mut cursor = heritage.walk();

    for clause in heritage.named_children(&mut cursor) {
        match clause.kind() {
            "extends_clause" => {
                structured = true;
                class.base_class = strip_keyword(clause, source, "extends");
            }
            "implements_clause" => {
                structured = true;
                let mut types = clause.walk();
                class.implemented_interfaces.extend(
                    clause
                        .named_children(&mut types)
                        .filter(|ty| ty.kind() != "comment")
                        .filter_map(|ty| node_text(ty, source)),
                );
            }
            _ => {}
        }
    }

    // La gramática de JavaScript no tiene `extends_clause`: class_heritage es `extends <expr>`.
    if !structured {
        class.base_class = strip_keyword(heritage, source, "extends");
    }
}

fn interface_model(node: Node<'_>, source: &[u8]) -> Option<InterfaceModel> {
    let name = node
        .child_by_field_name("name")
        .and_then(|name| node_text(name, source))?;
    let mut interface = InterfaceModel {
        name,
        ..InterfaceModel::default()
    };

    let Some(body) = node.child_by_field_name("body") else {
        return Some(interface);
    };

    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let member_name = member
            .child_by_field_name("name")
            .and_then(|name| node_text(name, source));
        match (member.kind(), member_name) {
            ("method_signature", Some(name)) => interface.methods.push(name),
            ("property_signature", Some(name)) => interface.properties.push(name),
            _ => {}
        }
    }

    Some(interface)
}

/// Tipo declarado de una propiedad; si no hay anotación, se infiere de un
/// inicializador literal.
fn property_type(member: Node<'_>, source: &[u8]) -> Option<String> {
    if let Some(annotation) = member.child_by_field_name("type") {
        return node_text(annotation, source)
            .map(|text| text.trim_start_matches(':').trim().to_string())
            .filter(|text| !text.is_empty());
    }

    let literal = match member.child_by_field_name("value")?.kind() {
        "number" => "number",
        "string" | "template_string" => "string",
        "true" | "false" => "boolean",
        _ => return None,
    };
    Some(literal.to_string())
}

fn is_accessor(method: Node<'_>) -> bool {
    let mut cursor = method.walk();
    let accessor = method
        .children(&mut cursor)
        .any(|child| !child.is_named() && matches!(child.kind(), "get" | "set"));
    accessor
}

fn strip_keyword(node: Node<'_>, source: &[u8], keyword: &str) -> Option<String> {
    let text = node_text(node, source)?;
    let rest = text.strip_prefix(keyword).unwrap_or(&text).trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn node_text(node: Node<'_>, source: &[u8]) -> Option<String> {
    node.utf8_text(source)
        .ok()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_one(name: &str, content: &str) -> SourceFile {
        SourceModelExtractor::default()
            .extract_file(&SourceInput::new(name, content))
            .expect("extraction failed")
    }

    #[test]
    fn detects_language_from_extension() {
        assert_eq!(SourceLanguage::from_path("src/app.ts"), Some(SourceLanguage::TypeScript));
        assert_eq!(SourceLanguage::from_path("View.TSX"), Some(SourceLanguage::Tsx));
        assert_eq!(SourceLanguage::from_path("lib/index.mjs"), Some(SourceLanguage::JavaScript));
        assert_eq!(SourceLanguage::from_path("main.py"), None);
        assert_eq!(SourceLanguage::from_path("Makefile"), None);
    }

    #[test]
    fn captures_classes_with_inheritance() {
        let file = extract_one("shapes.ts", "class A { foo() {} }\nclass B extends A {}\n");

        assert_eq!(file.file_path, "/virtual/shapes.ts");
        assert_eq!(file.classes.len(), 2);
        assert_eq!(file.classes[0].name.as_deref(), Some("A"));
        assert_eq!(file.classes[0].methods, vec!["foo"]);
        assert_eq!(file.classes[1].name.as_deref(), Some("B"));
        assert!(file.classes[1].methods.is_empty());
        assert_eq!(file.classes[1].base_class.as_deref(), Some("A"));
    }

    #[test]
    fn captures_typescript_members_and_interfaces() {
        let code = r#"
export interface Repo {
  url: string;
  fetch(path: string): Promise<string>;
}

export class GithubRepo extends BaseRepo<string> implements Repo, Disposable {
  url: string;
  retries = 3;
  private cache = new Map();
  constructor(private token: string) { super(); }
  get name() { return "gh"; }
  async fetch(path: string) { return load(path); }
  static create() { return new GithubRepo("t"); }
}
"#;
        let file = extract_one("repo.ts", code);

        assert_eq!(file.interfaces.len(), 1);
        assert_eq!(file.interfaces[0].name, "Repo");
        assert_eq!(file.interfaces[0].properties, vec!["url"]);
        assert_eq!(file.interfaces[0].methods, vec!["fetch"]);

        let class = &file.classes[0];
        assert_eq!(class.name.as_deref(), Some("GithubRepo"));
        assert_eq!(class.base_class.as_deref(), Some("BaseRepo<string>"));
        assert_eq!(class.implemented_interfaces, vec!["Repo", "Disposable"]);
        assert_eq!(class.methods, vec!["fetch", "create"]);

        let props: Vec<_> = class
            .properties
            .iter()
            .map(|p| (p.name.as_str(), p.type_text.as_deref()))
            .collect();
        assert_eq!(
            props,
            vec![("url", Some("string")), ("retries", Some("number")), ("cache", None)]
        );
    }

    #[test]
    fn abstract_methods_count_as_methods() {
        let file = extract_one(
            "base.ts",
            "export abstract class Shape { abstract area(): number; describe() { return 1; } }",
        );
        assert_eq!(file.classes[0].methods, vec!["area", "describe"]);
    }

    #[test]
    fn javascript_classes_and_fields() {
        let code = "class Counter extends Base { #count = 0; label = 'c'; inc() { this.#count++; } }";
        let file = extract_one("counter.js", code);

        let class = &file.classes[0];
        assert_eq!(class.base_class.as_deref(), Some("Base"));
        assert_eq!(class.methods, vec!["inc"]);
        assert_eq!(class.properties[0].name, "#count");
        assert_eq!(class.properties[1].type_text.as_deref(), Some("string"));
    }

    #[test]
    fn records_lexical_call_targets_in_order() {
        let code = r#"
function f(x) {
  g();
  this.h();
  obj.a.b();
  if (x) { k(); }
  const c = () => m();
  arr[0]();
  new Widget();
}
function g() {}
"#;
        let file = extract_one("calls.ts", code);

        assert_eq!(file.functions.len(), 2);
        assert_eq!(file.functions[0].name.as_deref(), Some("f"));
        assert_eq!(file.functions[0].calls, vec!["g", "h", "b", "k", "m"]);
        assert!(file.functions[1].calls.is_empty());
    }

    #[test]
    fn only_top_level_functions_are_modelled() {
        let code = "function outer() { function inner() { x(); } inner(); }";
        let file = extract_one("nested.js", code);

        assert_eq!(file.functions.len(), 1);
        assert_eq!(file.functions[0].calls, vec!["x", "inner"]);
    }

    #[test]
    fn exported_and_anonymous_declarations() {
        let code = "export function named() { run(); }\nexport default function () { go(); }\n";
        let file = extract_one("exports.ts", code);

        let names: Vec<_> = file.functions.iter().map(|f| f.name.as_deref()).collect();
        assert_eq!(names, vec![Some("named"), None]);
        assert_eq!(file.functions[1].calls, vec!["go"]);
    }

    #[test]
    fn unsupported_files_are_skipped_without_aborting_the_batch() {
        let inputs = vec![
            SourceInput::new("a.ts", "class A {}"),
            SourceInput::new("script.py", "class P: pass"),
            SourceInput::new("b.js", "function b() {}"),
        ];

        let extraction = SourceModelExtractor::default().extract(&inputs);

        assert_eq!(extraction.files.len(), 2);
        assert_eq!(extraction.files[1].file_path, "/virtual/b.js");
        assert_eq!(extraction.skipped.len(), 1);
        assert_eq!(extraction.skipped[0].name, "script.py");
    }

    #[test]
    fn syntax_errors_still_yield_a_partial_model() {
        let file = extract_one("broken.ts", "class Ok { run() {} }\nfunction (\n");
        assert_eq!(file.classes[0].name.as_deref(), Some("Ok"));
    }

    struct FixedCalls;

    impl CallExtractor for FixedCalls {
        fn callees(&self, _scope: Node<'_>, _source: &[u8]) -> Vec<String> {
            vec!["resolved".to_string()]
        }
    }

    #[test]
    fn call_extraction_is_pluggable() {
        let extractor = SourceModelExtractor::with_call_extractor(Arc::new(FixedCalls));
        let file = extractor
            .extract_file(&SourceInput::new("x.ts", "function f() { g(); }"))
            .unwrap();
        assert_eq!(file.functions[0].calls, vec!["resolved"]);
    }
}
