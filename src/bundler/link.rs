//! Bundle linker.
//!
//! Wraps every compiled unit in a CommonJS-style factory and appends a small
//! loader. Modules are emitted in identifier order so identical inputs link
//! to identical bytes.

use super::graph::ModuleGraph;

const PRELUDE: &str = r#"(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var module = (cache[id] = { exports: {} });
    var def = modules[id];
    def[0].call(module.exports, function (spec) {
      var target = def[1][spec];
      if (target === undefined) {
        if (typeof require === "function") return require(spec);
        throw new Error("Cannot find module '" + spec + "' from '" + id + "'");
      }
      return load(target);
    }, module, module.exports);
    return module.exports;
  }
  load(entry);
})({
"#;

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// Link the modules reachable from `entry` into a single script.
pub fn link(entry: &str, graph: &ModuleGraph) -> Vec<u8> {
    let mut out = String::from(PRELUDE);

    let units: Vec<String> = graph
        .modules()
        .map(|module| {
            let requires = module
                .requires
                .iter()
                .map(|(spec, id)| format!("{}: {}", quote(spec), quote(id)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{}: [function (require, module, exports) {{\n{}\n}}, {{{}}}]",
                quote(&module.id),
                String::from_utf8_lossy(&module.compiled).trim_end(),
                requires
            )
        })
        .collect();

    out.push_str(&units.join(",\n"));
    out.push_str(&format!("\n}}, {});\n", quote(entry)));
    out.into_bytes()
}
