//! Tree-sitter based extraction of endpoints and functions from Python
//! source.

use std::cell::RefCell;
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

use crate::error::{Error, Result};

use super::types::{SourceItem, FUNCTION_METHOD};

// Tree-sitter parsers are expensive to create but reusable across files,
// so each worker thread keeps one pre-configured instance.
thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "options", "head"];

/// Minimum non-blank source lines for a plain function to be emitted.
const MIN_FUNCTION_LINES: usize = 3;

/// The two disjoint streams extracted from one file.
#[derive(Debug, Default)]
pub struct FileItems {
    pub endpoints: Vec<SourceItem>,
    pub functions: Vec<SourceItem>,
}

/// Parse one Python file and extract endpoints plus notable functions.
///
/// `marker` is the dependency-injection marker name recognised in guard
/// positions (`Depends` by default). Functions classified as endpoints do
/// not reappear in the function stream.
pub fn extract_file(source: &str, rel_path: &str, marker: &str) -> Result<FileItems> {
    let tree = PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(source, None))
        .ok_or_else(|| Error::Parse(format!("failed to parse {rel_path}")))?;

    let mut items = FileItems::default();
    let mut seen_functions: HashSet<(String, String)> = HashSet::new();

    collect(
        &tree.root_node(),
        source,
        rel_path,
        marker,
        &mut items,
        &mut seen_functions,
    );

    Ok(items)
}

fn collect(
    node: &Node,
    source: &str,
    rel_path: &str,
    marker: &str,
    items: &mut FileItems,
    seen: &mut HashSet<(String, String)>,
) {
    if node.kind() == "function_definition" {
        visit_function(node, source, rel_path, marker, items, seen);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(&child, source, rel_path, marker, items, seen);
    }
}

fn visit_function(
    node: &Node,
    source: &str,
    rel_path: &str,
    marker: &str,
    items: &mut FileItems,
    seen: &mut HashSet<(String, String)>,
) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(&name_node, source);
    let code = node_text(node, source);

    if let Some((method, path)) = route_decorator(node, source) {
        let (arguments, guards) = parameters(node, source, marker);
        items.endpoints.push(SourceItem {
            function_name: name,
            method,
            path,
            guards,
            arguments,
            code,
            file_path: rel_path.to_string(),
            is_endpoint: true,
        });
        return;
    }

    let non_blank = code.lines().filter(|l| !l.trim().is_empty()).count();
    if non_blank < MIN_FUNCTION_LINES {
        return;
    }

    // Within-file dedup by (name, first-40-chars-of-source).
    let prefix: String = code.chars().take(40).collect();
    if !seen.insert((name.clone(), prefix)) {
        return;
    }

    let (arguments, guards) = parameters(node, source, marker);
    items.functions.push(SourceItem {
        function_name: name,
        method: FUNCTION_METHOD.to_string(),
        path: rel_path.to_string(),
        guards,
        arguments,
        code,
        file_path: rel_path.to_string(),
        is_endpoint: false,
    });
}

/// Look for a `<router>.<method>(<literal path>, ...)` decorator on the
/// enclosing `decorated_definition`.
fn route_decorator(function: &Node, source: &str) -> Option<(String, String)> {
    let parent = function.parent()?;
    if parent.kind() != "decorated_definition" {
        return None;
    }

    let mut cursor = parent.walk();
    for child in parent.children(&mut cursor) {
        if child.kind() != "decorator" {
            continue;
        }
        let Some(expr) = child.named_child(0) else {
            continue;
        };
        if expr.kind() != "call" {
            continue;
        }
        let Some(func) = expr.child_by_field_name("function") else {
            continue;
        };
        if func.kind() != "attribute" {
            continue;
        }
        let Some(attr) = func.child_by_field_name("attribute") else {
            continue;
        };
        let method = node_text(&attr, source).to_ascii_lowercase();
        if !HTTP_METHODS.contains(&method.as_str()) {
            continue;
        }

        // Path is the first positional string literal.
        let Some(args) = expr.child_by_field_name("arguments") else {
            continue;
        };
        let mut args_cursor = args.walk();
        let path = args
            .named_children(&mut args_cursor)
            .find(|a| a.kind() == "string")
            .map(|s| string_literal(&s, source));
        if let Some(path) = path {
            return Some((method.to_ascii_uppercase(), path));
        }
    }

    None
}

/// Collect parameter names and guard identifiers from the function's
/// parameter list. Guards are identifiers passed to the dependency marker
/// in default or keyword-default positions.
fn parameters(function: &Node, source: &str, marker: &str) -> (Vec<String>, Vec<String>) {
    let mut arguments = Vec::new();
    let mut guards = Vec::new();

    let Some(params) = function.child_by_field_name("parameters") else {
        return (arguments, guards);
    };

    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => arguments.push(node_text(&param, source)),
            "typed_parameter" => {
                if let Some(inner) = first_identifier(&param, source) {
                    arguments.push(inner);
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = param.child_by_field_name("name") {
                    arguments.push(node_text(&name, source));
                }
                if let Some(value) = param.child_by_field_name("value") {
                    if let Some(guard) = guard_from_default(&value, source, marker) {
                        guards.push(guard);
                    }
                }
            }
            _ => {}
        }
    }

    (arguments, guards)
}

/// Recognise `Depends(identifier)` (or the configured marker) in a default
/// value and return the injected identifier.
fn guard_from_default(value: &Node, source: &str, marker: &str) -> Option<String> {
    if value.kind() != "call" {
        return None;
    }
    let func = value.child_by_field_name("function")?;
    if func.kind() != "identifier" || node_text(&func, source) != marker {
        return None;
    }
    let args = value.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let result = args
        .named_children(&mut cursor)
        .find(|a| a.kind() == "identifier")
        .map(|a| node_text(&a, source));
    result
}

fn first_identifier(node: &Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "identifier")
        .map(|c| node_text(&c, source));
    result
}

fn node_text(node: &Node, source: &str) -> String {
    source[node.byte_range()].to_string()
}

/// Unquote a Python string literal node, tolerating prefixes (f, r, b).
fn string_literal(node: &Node, source: &str) -> String {
    let raw = node_text(node, source);
    let start = raw.find(['"', '\'']).unwrap_or(0);
    raw[start..].trim_matches(['"', '\'']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
from fastapi import APIRouter, Depends

router = APIRouter()

@router.get("/users/{user_id}")
async def get_user(user_id: int, db = Depends(get_db), user = Depends(get_current_user)):
    record = db.query(User).get(user_id)
    return record

@router.post('/orders', status_code=201)
def create_order(order: OrderIn, db=Depends(get_db)):
    db.add(order)
    db.commit()
    return order

def helper_formats(value):
    out = str(value)
    out = out.strip()
    return out

def tiny():
    pass
"#;

    fn extract(source: &str) -> FileItems {
        extract_file(source, "app/api.py", "Depends").unwrap()
    }

    #[test]
    fn finds_route_decorated_endpoints() {
        let items = extract(SAMPLE);
        assert_eq!(items.endpoints.len(), 2);

        let get_user = &items.endpoints[0];
        assert_eq!(get_user.function_name, "get_user");
        assert_eq!(get_user.method, "GET");
        assert_eq!(get_user.path, "/users/{user_id}");
        assert_eq!(get_user.guards, vec!["get_db", "get_current_user"]);
        assert!(get_user.arguments.contains(&"user_id".to_string()));
        assert!(get_user.is_endpoint);
        assert_eq!(get_user.key(), "GET:/users/{user_id}");

        let create_order = &items.endpoints[1];
        assert_eq!(create_order.method, "POST");
        assert_eq!(create_order.path, "/orders");
        assert_eq!(create_order.guards, vec!["get_db"]);
    }

    #[test]
    fn endpoint_functions_stay_out_of_the_function_stream() {
        let items = extract(SAMPLE);
        let names: Vec<&str> = items
            .functions
            .iter()
            .map(|f| f.function_name.as_str())
            .collect();
        assert!(!names.contains(&"get_user"));
        assert!(!names.contains(&"create_order"));
    }

    #[test]
    fn short_functions_are_dropped() {
        let items = extract(SAMPLE);
        let names: Vec<&str> = items
            .functions
            .iter()
            .map(|f| f.function_name.as_str())
            .collect();
        assert_eq!(names, vec!["helper_formats"]);
        let helper = &items.functions[0];
        assert_eq!(helper.method, FUNCTION_METHOD);
        assert_eq!(helper.path, "app/api.py");
        assert_eq!(helper.key(), "FUNCTION:helper_formats:app/api.py");
    }

    #[test]
    fn reparsing_yields_identical_endpoints() {
        let first = extract(SAMPLE);
        let second = extract(SAMPLE);
        let keys = |items: &FileItems| -> Vec<(String, Vec<String>)> {
            items
                .endpoints
                .iter()
                .map(|e| (e.key(), e.guards.clone()))
                .collect()
        };
        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn duplicate_functions_dedup_within_a_file() {
        let source = r#"
def repeated(a):
    x = a + 1
    y = x * 2
    return y

def repeated(a):
    x = a + 1
    y = x * 2
    return y
"#;
        let items = extract(source);
        assert_eq!(items.functions.len(), 1);
    }

    #[test]
    fn non_route_decorators_are_not_endpoints() {
        let source = r#"
@functools.lru_cache()
def cached_settings():
    cfg = load()
    cfg.validate()
    return cfg
"#;
        let items = extract(source);
        assert!(items.endpoints.is_empty());
        assert_eq!(items.functions.len(), 1);
    }

    #[test]
    fn custom_marker_is_honoured() {
        let source = r#"
@router.get("/things")
def list_things(db = Inject(get_db)):
    rows = db.query(Thing).all()
    return rows
"#;
        let with_default = extract_file(source, "t.py", "Depends").unwrap();
        assert!(with_default.endpoints[0].guards.is_empty());

        let with_custom = extract_file(source, "t.py", "Inject").unwrap();
        assert_eq!(with_custom.endpoints[0].guards, vec!["get_db"]);
    }
}
