//! Modelos de dominio: ficheros de entrada y modelo estructural extraído del código.
//!
//! Todos los modelos se crean por petición y no se mutan tras construirse.

use serde::{Deserialize, Serialize};

/// Prefijo de las rutas virtuales que el extractor asigna a cada fichero.
pub const VIRTUAL_ROOT: &str = "/virtual/";

/// Un fichero de código tal y como llega de la fuente (GitHub o el propio cuerpo de la petición).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInput {
    pub name: String,
    pub content: String,
}

impl SourceInput {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Modelo estructural de un fichero: clases, interfaces y funciones de primer nivel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub file_path: String,
    pub classes: Vec<ClassModel>,
    pub interfaces: Vec<InterfaceModel>,
    pub functions: Vec<FunctionModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassModel {
    /// `None` para clases anónimas (`export default class {}`).
    pub name: Option<String>,
    pub properties: Vec<PropertyModel>,
    pub methods: Vec<String>,
    pub base_class: Option<String>,
    pub implemented_interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyModel {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceModel {
    pub name: String,
    pub methods: Vec<String>,
    pub properties: Vec<String>,
}

/// Función de primer nivel con los destinos de llamada vistos en su cuerpo.
///
/// Los destinos son identificadores léxicos, no símbolos resueltos.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunctionModel {
    pub name: Option<String>,
    pub calls: Vec<String>,
}

/// Fichero que el extractor no pudo modelar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Resultado de extraer un lote de ficheros.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
}
