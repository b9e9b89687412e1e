//! File-name based language tagging.

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    Plaintext,
    C,
    Cpp,
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    Rust,
    Shell,
    Html,
    Css,
    Json,
    Xml,
    Markdown,
    Php,
    Ruby,
    Lua,
    Kotlin,
    Swift,
    Dart,
    Sql,
    R,
    Nim,
    Elixir,
    Erlang,
    Haskell,
    OCaml,
    FSharp,
    Clojure,
    Scala,
    Groovy,
    Verilog,
    SystemVerilog,
    Vhdl,
    Asm,
    Toml,
    Yaml,
    Ini,
    CMake,
    Make,
}

const BY_FILE_NAME: &[(&str, Language)] = &[
    ("CMakeLists.txt", Language::CMake),
    ("Makefile", Language::Make),
    ("makefile", Language::Make),
    ("GNUmakefile", Language::Make),
];

// Extensions are matched case-sensitively: `.s` and `.S` are both listed.
const BY_EXTENSION: &[(&str, Language)] = &[
    ("c", Language::C),
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("cxx", Language::Cpp),
    ("h", Language::Cpp),
    ("hpp", Language::Cpp),
    ("js", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("py", Language::Python),
    ("java", Language::Java),
    ("go", Language::Go),
    ("rs", Language::Rust),
    ("sh", Language::Shell),
    ("bash", Language::Shell),
    ("html", Language::Html),
    ("htm", Language::Html),
    ("css", Language::Css),
    ("json", Language::Json),
    ("xml", Language::Xml),
    ("md", Language::Markdown),
    ("php", Language::Php),
    ("rb", Language::Ruby),
    ("lua", Language::Lua),
    ("kt", Language::Kotlin),
    ("swift", Language::Swift),
    ("dart", Language::Dart),
    ("sql", Language::Sql),
    ("r", Language::R),
    ("nim", Language::Nim),
    ("ex", Language::Elixir),
    ("exs", Language::Elixir),
    ("erl", Language::Erlang),
    ("hs", Language::Haskell),
    ("ml", Language::OCaml),
    ("fs", Language::FSharp),
    ("clj", Language::Clojure),
    ("scala", Language::Scala),
    ("groovy", Language::Groovy),
    ("v", Language::Verilog),
    ("sv", Language::SystemVerilog),
    ("vhdl", Language::Vhdl),
    ("vhd", Language::Vhdl),
    ("asm", Language::Asm),
    ("s", Language::Asm),
    ("S", Language::Asm),
    ("nasm", Language::Asm),
    ("toml", Language::Toml),
    ("yaml", Language::Yaml),
    ("yml", Language::Yaml),
    ("ini", Language::Ini),
    ("cfg", Language::Ini),
    ("conf", Language::Ini),
    ("cmake", Language::CMake),
    ("mak", Language::Make),
    ("mk", Language::Make),
];

impl Language {
    /// Tag a path by exact file name first, then by extension.
    pub fn detect(path: &Path) -> Self {
        let name = path.file_name().and_then(|n| n.to_str());
        if let Some(name) = name
            && let Some((_, lang)) = BY_FILE_NAME.iter().find(|(n, _)| *n == name)
        {
            return *lang;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| BY_EXTENSION.iter().find(|(e, _)| *e == ext))
            .map(|(_, lang)| *lang)
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Plaintext => "plaintext",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Shell => "shell",
            Language::Html => "html",
            Language::Css => "css",
            Language::Json => "json",
            Language::Xml => "xml",
            Language::Markdown => "markdown",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Lua => "lua",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Dart => "dart",
            Language::Sql => "sql",
            Language::R => "r",
            Language::Nim => "nim",
            Language::Elixir => "elixir",
            Language::Erlang => "erlang",
            Language::Haskell => "haskell",
            Language::OCaml => "ocaml",
            Language::FSharp => "fsharp",
            Language::Clojure => "clojure",
            Language::Scala => "scala",
            Language::Groovy => "groovy",
            Language::Verilog => "verilog",
            Language::SystemVerilog => "systemverilog",
            Language::Vhdl => "vhdl",
            Language::Asm => "asm",
            Language::Toml => "toml",
            Language::Yaml => "yaml",
            Language::Ini => "ini",
            Language::CMake => "cmake",
            Language::Make => "make",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
