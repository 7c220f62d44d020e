use tree_sitter::Language;

pub struct LanguageConfig {
    pub name: &'static str,
    pub language: Language,
    pub extensions: &'static [&'static str],
    pub query: &'static str,
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![typescript_config(), tsx_config(), javascript_config()]
    }

    pub fn get_by_extension(ext: &str) -> Option<LanguageConfig> {
        let ext = ext.to_ascii_lowercase();
        Self::get_all()
            .into_iter()
            .find(|c| c.extensions.contains(&ext.as_str()))
    }
}

/// Display name for a file extension, used for chunk metadata and fences.
pub fn language_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        _ => "text",
    }
}

const TS_QUERY: &str = r#"
(function_declaration
  name: (identifier) @name) @function

(generator_function_declaration
  name: (identifier) @name) @function

(export_statement
  (function_expression
    name: (identifier) @name) @function)

(lexical_declaration
  (variable_declarator
    name: (identifier) @name
    value: (arrow_function))) @function

(lexical_declaration
  (variable_declarator
    name: (identifier) @name)) @variable

(variable_declaration
  (variable_declarator
    name: (identifier) @name)) @variable

(class_declaration
  name: (type_identifier) @name) @class

(abstract_class_declaration
  name: (type_identifier) @name) @class

(interface_declaration
  name: (type_identifier) @name) @interface

(type_alias_declaration
  name: (type_identifier) @name) @type

(method_definition
  name: (property_identifier) @name) @method
"#;

const JS_QUERY: &str = r#"
(function_declaration
  name: (identifier) @name) @function

(generator_function_declaration
  name: (identifier) @name) @function

(export_statement
  (function_expression
    name: (identifier) @name) @function)

(lexical_declaration
  (variable_declarator
    name: (identifier) @name
    value: (arrow_function))) @function

(lexical_declaration
  (variable_declarator
    name: (identifier) @name)) @variable

(variable_declaration
  (variable_declarator
    name: (identifier) @name)) @variable

(class_declaration
  name: (identifier) @name) @class

(method_definition
  name: (property_identifier) @name) @method
"#;

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        extensions: &["ts", "mts", "cts"],
        query: TS_QUERY,
    }
}

fn tsx_config() -> LanguageConfig {
    LanguageConfig {
        name: "tsx",
        language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        extensions: &["tsx"],
        query: TS_QUERY,
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        language: tree_sitter_javascript::LANGUAGE.into(),
        extensions: &["js", "jsx", "mjs", "cjs"],
        query: JS_QUERY,
    }
}
