//! Proyección del modelo estructural a texto Mermaid (diagramas de clases y de secuencia).
//!
//! La proyección es determinista y barata: no emite relaciones entre clases ni
//! participantes; ese enriquecimiento lo hace el refinador con el LLM.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::SourceFile;

/// Palabras clave que el renderizador acepta como primera línea de un diagrama.
pub const MERMAID_KEYWORDS: [&str; 9] = [
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
];

/// Notación de diagrama; se elige una vez por petición y selecciona proyector y
/// prompt de refinado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    #[default]
    Class,
    Sequence,
}

impl DiagramKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "class" | "classdiagram" | "class-diagram" => Some(Self::Class),
            "sequence" | "sequencediagram" | "sequence-diagram" => Some(Self::Sequence),
            _ => None,
        }
    }

    /// Palabra clave Mermaid con la que empieza el diagrama.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Class => "classDiagram",
            Self::Sequence => "sequenceDiagram",
        }
    }

    pub fn project(self, files: &[SourceFile]) -> String {
        match self {
            Self::Class => class_diagram(files),
            Self::Sequence => sequence_diagram(files),
        }
    }
}

/// Un bloque `class <Nombre> { ... }` por clase con nombre, en orden de fichero
/// y de declaración. Las clases anónimas se omiten.
pub fn class_diagram(files: &[SourceFile]) -> String {
    let mut out = String::from("classDiagram\n");

    for class in files.iter().flat_map(|file| &file.classes) {
        let Some(name) = class.name.as_deref() else {
            continue;
        };
        let _ = writeln!(out, "  class {name} {{");
        for property in &class.properties {
            match property.type_text.as_deref() {
                Some(ty) => {
                    let _ = writeln!(out, "    {}: {}", property.name, ty);
                }
                None => {
                    let _ = writeln!(out, "    {}", property.name);
                }
            }
        }
        for method in &class.methods {
            let _ = writeln!(out, "    {method}()");
        }
        out.push_str("  }\n");
    }

    out
}

/// Una flecha `caller->>callee: Call callee` por cada llamada registrada, sin
/// deduplicar y en orden de descubrimiento. Las funciones anónimas se omiten.
pub fn sequence_diagram(files: &[SourceFile]) -> String {
    let mut out = String::from("sequenceDiagram\n");

    for function in files.iter().flat_map(|file| &file.functions) {
        let Some(caller) = function.name.as_deref() else {
            continue;
        };
        for callee in &function.calls {
            let _ = writeln!(out, "  {caller}->>{callee}: Call {callee}");
        }
    }

    out
}

/// Comprueba que la primera línea no vacía empiece por una palabra clave Mermaid.
pub fn is_mermaid_code(code: &str) -> bool {
    code.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|first| MERMAID_KEYWORDS.iter().any(|kw| first.starts_with(kw)))
}
