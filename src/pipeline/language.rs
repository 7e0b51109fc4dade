//! Language classification: file extension → rendering-service language tag.
//!
//! Unknown extensions map to [`AUTO`], which tells the service to detect the
//! language itself.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

/// Tag that asks the service to auto-detect.
pub const AUTO: &str = "auto";

static EXTENSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("js", "javascript"),
        ("mjs", "javascript"),
        ("cjs", "javascript"),
        ("jsx", "javascript"),
        ("ts", "typescript"),
        ("mts", "typescript"),
        ("tsx", "typescript"),
        ("py", "python"),
        ("rb", "ruby"),
        ("cs", "csharp"),
        ("c", "cpp"),
        ("cc", "cpp"),
        ("cpp", "cpp"),
        ("cxx", "cpp"),
        ("h", "cpp"),
        ("hpp", "cpp"),
        ("md", "markdown"),
        ("markdown", "markdown"),
        ("sh", "bash"),
        ("bash", "bash"),
        ("zsh", "bash"),
        ("yml", "yaml"),
        ("yaml", "yaml"),
        ("rs", "rust"),
        ("go", "go"),
        ("java", "java"),
        ("kt", "kotlin"),
        ("kts", "kotlin"),
        ("swift", "swift"),
        ("php", "php"),
        ("css", "css"),
        ("scss", "scss"),
        ("html", "html"),
        ("htm", "html"),
        ("json", "json"),
        ("toml", "toml"),
        ("sql", "sql"),
        ("lua", "lua"),
        ("dart", "dart"),
        ("ex", "elixir"),
        ("exs", "elixir"),
        ("erl", "erlang"),
        ("hs", "haskell"),
        ("ml", "ocaml"),
        ("r", "r"),
        ("scala", "scala"),
        ("sol", "solidity"),
        ("svelte", "svelte"),
        ("vue", "vue"),
        ("xml", "xml"),
        ("zig", "zig"),
        ("graphql", "graphql"),
        ("gql", "graphql"),
        ("tex", "latex"),
        ("jl", "julia"),
        ("clj", "clojure"),
        ("cr", "crystal"),
        ("elm", "elm"),
        ("gleam", "gleam"),
        ("ps1", "powershell"),
        ("m", "objective-c"),
        ("prisma", "prisma"),
        ("astro", "astro"),
        ("diff", "diff"),
        ("patch", "diff"),
        ("lisp", "lisp"),
        ("txt", "plaintext"),
    ])
});

/// Map an extension (without the dot, any case) to a language tag.
pub fn language_for_extension(extension: &str) -> &'static str {
    EXTENSIONS
        .get(extension.to_lowercase().as_str())
        .copied()
        .unwrap_or(AUTO)
}

/// Classify a repository path by its extension, or by name for `Dockerfile`.
pub fn classify(path: &str) -> &'static str {
    let path = Path::new(path);
    let is_dockerfile = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case("dockerfile"));
    if is_dockerfile {
        return "docker";
    }

    path.extension()
        .and_then(|e| e.to_str())
        .map(language_for_extension)
        .unwrap_or(AUTO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(classify("src/index.ts"), "typescript");
        assert_eq!(classify("app/view.jsx"), "javascript");
        assert_eq!(classify("lib/x.rb"), "ruby");
        assert_eq!(classify("include/a.h"), "cpp");
        assert_eq!(classify(".github/workflows/ci.yml"), "yaml");
        assert_eq!(classify("src/main.rs"), "rust");
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(classify("README.MD"), "markdown");
        assert_eq!(language_for_extension("PY"), "python");
    }

    #[test]
    fn unknown_or_missing_extension_is_auto() {
        assert_eq!(classify("Makefile"), AUTO);
        assert_eq!(classify("data.xyz"), AUTO);
        assert_eq!(classify(".gitignore"), AUTO);
    }

    #[test]
    fn dockerfile_by_name() {
        assert_eq!(classify("docker/Dockerfile"), "docker");
    }
}
