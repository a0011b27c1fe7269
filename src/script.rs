//! Entry script builder: generates the self-contained `runner.py` the child
//! process actually runs. The user code is embedded as a JSON-escaped string
//! literal and executed in a fresh namespace — isolation comes from the
//! process boundary, not from in-process evaluation tricks.

use std::fs;
use std::path::PathBuf;

use crate::error::ExecError;
use crate::protocol::SENTINEL;
use crate::workspace::Workspace;

/// Builtins exposed when the request disables full globals. Enough for basic
/// control flow and data shaping; import and introspection primitives
/// (`__import__`, `eval`, `exec`, `open`, `getattr`, `globals`, ...) are
/// deliberately absent.
const SAFE_BUILTINS: &[&str] = &[
    "__build_class__",
    "__name__",
    "ArithmeticError",
    "AttributeError",
    "BaseException",
    "Exception",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
    "abs",
    "all",
    "any",
    "bool",
    "callable",
    "chr",
    "dict",
    "divmod",
    "enumerate",
    "filter",
    "float",
    "format",
    "frozenset",
    "hash",
    "int",
    "isinstance",
    "issubclass",
    "iter",
    "len",
    "list",
    "map",
    "max",
    "min",
    "next",
    "ord",
    "pow",
    "print",
    "range",
    "repr",
    "reversed",
    "round",
    "set",
    "slice",
    "sorted",
    "str",
    "sum",
    "tuple",
    "zip",
];

const TEMPLATE: &str = r#"import asyncio
import contextlib
import inspect
import io
import json
import sys
import time
import traceback

SOURCE = @SOURCE@
FILES_WRITTEN = @FILES@
RESTRICT_BUILTINS = @RESTRICT@
SAFE_BUILTIN_NAMES = @SAFE_BUILTINS@


def _jsonable(value):
    try:
        json.dumps(value)
        return value
    except Exception:
        return str(value)


def _snapshot(namespace):
    out = {}
    for name, value in namespace.items():
        if name.startswith("__"):
            continue
        try:
            out[name] = str(value)
        except Exception:
            out[name] = "<unrepr>"
    return out


def _restricted_builtins():
    import builtins
    return {
        name: getattr(builtins, name)
        for name in SAFE_BUILTIN_NAMES
        if hasattr(builtins, name)
    }


def _run():
    start = time.perf_counter()
    captured_out = io.StringIO()
    captured_err = io.StringIO()
    namespace = {}
    if RESTRICT_BUILTINS:
        namespace["__builtins__"] = _restricted_builtins()
    value = None
    error = None
    try:
        with contextlib.redirect_stdout(captured_out), contextlib.redirect_stderr(captured_err):
            exec(compile(SOURCE, "<submitted>", "exec"), namespace, namespace)
            entry = namespace.get("main")
            if inspect.iscoroutinefunction(entry):
                value = asyncio.run(entry())
            elif callable(entry):
                value = entry()
    except BaseException as exc:
        value = None
        error = {
            "kind": type(exc).__name__,
            "message": str(exc),
            "trace": traceback.format_exc(),
        }
    payload = {
        "stdout": captured_out.getvalue(),
        "stderr": captured_err.getvalue(),
        "value": _jsonable(value),
        "exception": error,
        "locals": _snapshot(namespace),
        "files_written": FILES_WRITTEN,
        "execution_time": time.perf_counter() - start,
    }
    sys.stdout.write("\n@SENTINEL@" + json.dumps(payload, default=str) + "\n")


if __name__ == "__main__":
    _run()
"#;

/// Write `runner.py` into the workspace and return its path.
pub fn build(
    code: &str,
    workspace: &Workspace,
    globals_enabled: bool,
) -> Result<PathBuf, ExecError> {
    let source_literal =
        serde_json::to_string(code).map_err(|e| ExecError::Workspace(e.into()))?;
    let files_literal = serde_json::to_string(&workspace.files_written)
        .map_err(|e| ExecError::Workspace(e.into()))?;
    let safe_builtins = serde_json::to_string(SAFE_BUILTINS)
        .map_err(|e| ExecError::Workspace(e.into()))?;

    let script = render_template(&[
        ("@SOURCE@", source_literal.as_str()),
        ("@FILES@", files_literal.as_str()),
        (
            "@RESTRICT@",
            if globals_enabled { "False" } else { "True" },
        ),
        ("@SAFE_BUILTINS@", safe_builtins.as_str()),
        ("@SENTINEL@", SENTINEL),
    ]);

    let path = workspace.root.join("runner.py");
    fs::write(&path, script)?;
    Ok(path)
}

/// Substitute each placeholder in one left-to-right pass over the template.
/// Substituted values are never rescanned, so a token appearing inside user
/// code or a request file path stays literal.
fn render_template(substitutions: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(TEMPLATE.len());
    let mut rest = TEMPLATE;
    while let Some((idx, token, value)) = substitutions
        .iter()
        .filter_map(|(token, value)| rest.find(token).map(|idx| (idx, *token, *value)))
        .min_by_key(|(idx, ..)| *idx)
    {
        out.push_str(&rest[..idx]);
        out.push_str(value);
        rest = &rest[idx + token.len()..];
    }
    out.push_str(rest);
    out
}
