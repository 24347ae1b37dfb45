//! Embedded Lua environment.
//!
//! Each sandbox owns its own Lua state. Only the `string`, `table`, `math`
//! and `utf8` libraries are opened, and the parts of the base library that
//! reach the host are removed, so compiled code cannot touch files,
//! processes, or another sandbox.

use std::sync::Arc;

use mlua::{Function, Lua, LuaOptions, LuaSerdeExt, SerializeOptions, StdLib, Value as LuaValue};
use serde_json::Value;

use super::environment::{Environment, ScriptError, Template};

/// Runtime support layer evaluated once per sandbox.
const RUNTIME: &str = include_str!("runtime.lua");

/// Clears the delegate registries before artifacts are evaluated again.
const RESET_REGISTRIES: &str = r#"
soy.__delegate_priorities = {}
soy.__delegate_functions = {}
"#;

/// Base-library globals removed from every state.
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "require", "print", "collectgarbage"];

pub struct LuaEnvironment {
    lua: Lua,
    /// Captured before any script runs, so artifacts cannot replace it.
    tostring: Function,
}

impl LuaEnvironment {
    pub fn new() -> Result<Self, ScriptError> {
        let libs = StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8;
        let lua = Lua::new_with(libs, LuaOptions::default())?;

        let globals = lua.globals();
        let tostring: Function = globals.get("tostring")?;
        for name in REMOVED_GLOBALS {
            globals.set(*name, LuaValue::Nil)?;
        }

        Ok(Self { lua, tostring })
    }

    /// Boxed constructor for use as an [`EnvironmentFactory`](super::EnvironmentFactory).
    pub fn boxed() -> Result<Box<dyn Environment>, ScriptError> {
        Ok(Box::new(Self::new()?))
    }
}

impl Environment for LuaEnvironment {
    fn load_runtime(&mut self) -> Result<(), ScriptError> {
        self.lua.load(RUNTIME).set_name("=runtime").exec()?;
        Ok(())
    }

    fn reset_registries(&mut self) -> Result<(), ScriptError> {
        self.lua.load(RESET_REGISTRIES).set_name("=reset").exec()?;
        Ok(())
    }

    fn evaluate(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        self.lua.load(source).set_name(format!("@{name}")).exec()?;
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn Template>> {
        let mut value = LuaValue::Table(self.lua.globals());
        for segment in name.split('.') {
            let LuaValue::Table(table) = value else {
                return None;
            };
            value = table.get::<LuaValue>(segment).ok()?;
        }

        match value {
            LuaValue::Function(func) => Some(Arc::new(LuaTemplate {
                lua: self.lua.clone(),
                func,
                tostring: self.tostring.clone(),
            })),
            _ => None,
        }
    }
}

struct LuaTemplate {
    lua: Lua,
    func: Function,
    tostring: Function,
}

impl LuaTemplate {
    /// JSON `null` becomes `nil`, so absent injected data reads as nil in templates.
    fn to_lua(&self, value: &Value) -> Result<LuaValue, ScriptError> {
        let options = SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false);
        Ok(self.lua.to_value_with(value, options)?)
    }
}

impl Template for LuaTemplate {
    fn call(&self, data: &Value, injected: &Value) -> Result<String, ScriptError> {
        let data = self.to_lua(data)?;
        let injected = self.to_lua(injected)?;
        let result: LuaValue = self.func.call((data, LuaValue::Nil, injected))?;

        match result {
            LuaValue::String(s) => Ok(s.to_str()?.to_string()),
            other => Ok(self.tostring.call::<String>(other)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready() -> LuaEnvironment {
        let mut env = LuaEnvironment::new().unwrap();
        env.load_runtime().unwrap();
        env
    }

    #[test]
    fn test_host_access_removed() {
        let mut env = ready();
        env.evaluate(
            "exposed",
            "exposed = { io = io, os = os, dofile = dofile, require = require, load = load }",
        )
        .unwrap();

        for name in ["io", "os", "dofile", "require", "load"] {
            let value: LuaValue = env
                .lua
                .globals()
                .get::<mlua::Table>("exposed")
                .unwrap()
                .get(name)
                .unwrap();
            assert!(value.is_nil(), "{name} should not be reachable");
        }
    }

    #[test]
    fn test_string_library_available() {
        let mut env = ready();
        env.evaluate("t", "t = {} function t.up(d) return string.upper(d.word) end")
            .unwrap();

        let template = env.resolve("t.up").unwrap();
        assert_eq!(template.call(&json!({"word": "abc"}), &Value::Null).unwrap(), "ABC");
    }

    #[test]
    fn test_resolve_dotted_name() {
        let mut env = ready();
        env.evaluate(
            "mail",
            "mail = { letters = {} } function mail.letters.hello() return 'hi' end",
        )
        .unwrap();

        assert!(env.resolve("mail.letters.hello").is_some());
        assert!(env.resolve("mail.letters.missing").is_none());
        assert!(env.resolve("mail.letters").is_none());
        assert!(env.resolve("nothing.here").is_none());
    }

    #[test]
    fn test_call_passes_injected_data_and_nil_slot() {
        let mut env = ready();
        env.evaluate(
            "t",
            "t = {} function t.f(d, legacy, ij) return tostring(legacy) .. ':' .. ij.site end",
        )
        .unwrap();

        let out = env
            .resolve("t.f")
            .unwrap()
            .call(&json!({}), &json!({"site": "example.org"}))
            .unwrap();
        assert_eq!(out, "nil:example.org");
    }

    #[test]
    fn test_null_injected_is_nil() {
        let mut env = ready();
        env.evaluate("t", "t = {} function t.f(d, _, ij) return tostring(ij == nil) end")
            .unwrap();

        let out = env.resolve("t.f").unwrap().call(&json!({}), &Value::Null).unwrap();
        assert_eq!(out, "true");
    }

    #[test]
    fn test_sanitized_result_coerced() {
        let mut env = ready();
        env.evaluate(
            "t",
            "t = {} function t.f() return soy.sanitized('<b>bold</b>', 'html') end",
        )
        .unwrap();

        let out = env.resolve("t.f").unwrap().call(&json!({}), &Value::Null).unwrap();
        assert_eq!(out, "<b>bold</b>");
    }

    #[test]
    fn test_escape_html() {
        let mut env = ready();
        env.evaluate(
            "t",
            "t = {} function t.f(d) return soy.escapeHtml(d.text) .. soy.escapeHtml(soy.sanitized('<i>')) end",
        )
        .unwrap();

        let out = env
            .resolve("t.f")
            .unwrap()
            .call(&json!({"text": "a < b & \"c\""}), &Value::Null)
            .unwrap();
        assert_eq!(out, "a &lt; b &amp; &quot;c&quot;<i>");
    }

    #[test]
    fn test_numeric_result_coerced() {
        let mut env = ready();
        env.evaluate("t", "t = {} function t.f() return 42 end").unwrap();

        let out = env.resolve("t.f").unwrap().call(&json!({}), &Value::Null).unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_duplicate_delegate_and_reset() {
        let mut env = ready();
        let register = "soy.register_delegate('greeting', '', 0, function() return 'hi' end)";

        env.evaluate("a", register).unwrap();
        let err = env.evaluate("b", register).unwrap_err();
        assert!(err.0.contains("duplicate delegate"));

        env.reset_registries().unwrap();
        env.evaluate("a", register).unwrap();
    }

    #[test]
    fn test_delegate_priority() {
        let mut env = ready();
        env.evaluate(
            "d",
            r#"
            soy.register_delegate('greeting', nil, 0, function() return 'low' end)
            soy.register_delegate('greeting', nil, 1, function() return 'high' end)
            t = {}
            function t.f() return soy.get_delegate('greeting', 'fancy')() end
            "#,
        )
        .unwrap();

        let out = env.resolve("t.f").unwrap().call(&json!({}), &Value::Null).unwrap();
        assert_eq!(out, "high");
    }

    #[test]
    fn test_runtime_error_surfaces() {
        let mut env = ready();
        env.evaluate("t", "t = {} function t.f() error('boom') end").unwrap();

        let err = env.resolve("t.f").unwrap().call(&json!({}), &Value::Null).unwrap_err();
        assert!(err.0.contains("boom"));
    }

    #[test]
    fn test_syntax_error_names_script() {
        let mut env = ready();
        let err = env.evaluate("broken.soy.lua", "function (").unwrap_err();
        assert!(err.0.contains("broken.soy.lua"));
    }

    #[test]
    fn test_states_are_isolated() {
        let mut a = ready();
        let b = ready();
        a.evaluate("t", "shared = {} function shared.f() return 'a' end").unwrap();

        assert!(a.resolve("shared.f").is_some());
        assert!(b.resolve("shared.f").is_none());
    }
}
