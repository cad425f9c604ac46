//! Path resolution for the managed formatter.
//!
//! Private installs live under the OS temp directory, one directory per
//! version key:
//!
//! - Linux: `/tmp/tidyhost/prettier_3.3.3/`
//! - macOS: `/var/folders/.../tidyhost/prettier_latest/`
//! - Windows: `C:\Users\<User>\AppData\Local\Temp\tidyhost\prettier_latest\`
//!
//! Everything here except the lookups that probe the filesystem is a pure
//! function of its inputs.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::{
    VersionKey, PROJECT_MANIFEST, SCRIPT_RELATIVE_PATH, SCRIPT_RELATIVE_PATH_LEGACY, TOOL_NAME,
};

/// Subdirectory name under the OS temp folder.
const TIDYHOST_TEMP_DIR: &str = "tidyhost";

/// npm's JavaScript entry point, relative to a directory holding the npm package.
const NPM_CLI_RELATIVE_PATH: &[&str] = &["node_modules", "npm", "bin", "npm-cli.js"];

/// Same entry point for Unix-style prefixes where `npm` lives in `<prefix>/bin`.
const NPM_CLI_PREFIX_RELATIVE_PATH: &[&str] =
    &["..", "lib", "node_modules", "npm", "bin", "npm-cli.js"];

/// Runtime directory shared between host versions, two levels above the host executable.
const SHARED_RUNTIME_SUBDIR: &[&str] = &["Web", "External"];

/// Tool directory bundled next to the host executable.
const BUNDLED_TOOLS_SUBDIR: &[&str] = &["Extensions", "Web Tools", "External"];

/// Source-control helpers bundled inside the tool directory.
const BUNDLED_SCM_SUBDIR: &str = "git";

#[cfg(windows)]
const NPM_EXECUTABLE: &str = "npm.cmd";
#[cfg(not(windows))]
const NPM_EXECUTABLE: &str = "npm";

fn join_all(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |acc, part| acc.join(part))
}

// ============================================================================
// Private Installs
// ============================================================================

/// Returns the base tidyhost directory inside the OS temp folder.
pub fn get_tidyhost_temp_dir() -> PathBuf {
    std::env::temp_dir().join(TIDYHOST_TEMP_DIR)
}

/// Replaces characters that are not valid in a single directory name.
///
/// Path separators of both flavours, `@` and `:` all become `_`.
pub fn sanitize_dir_name(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | '@' | ':' => '_',
            other => other,
        })
        .collect()
}

/// Location of one version-pinned private install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateInstall {
    /// Directory the package manager runs in.
    pub install_dir: PathBuf,
    /// Formatter entry script inside `install_dir`.
    pub executable: PathBuf,
}

impl PrivateInstall {
    /// Readiness is derived from disk, so a removed install is noticed on the next check.
    pub fn is_ready(&self) -> bool {
        self.executable.is_file()
    }
}

/// Root under which all private installs are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    root: PathBuf,
}

impl ToolPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `{temp}/tidyhost/` as the root.
    pub fn from_temp_dir() -> Self {
        Self::new(get_tidyhost_temp_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Computes the install directory and entry script for a version key.
    pub fn private_install(&self, version: &VersionKey) -> PrivateInstall {
        let dir_name = sanitize_dir_name(&format!("{}@{}", TOOL_NAME, version.as_str()));
        let install_dir = self.root.join(dir_name);
        let executable = join_all(&install_dir, SCRIPT_RELATIVE_PATH);
        PrivateInstall {
            install_dir,
            executable,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::from_temp_dir()
    }
}

// ============================================================================
// Project-local Lookup
// ============================================================================

/// Finds a formatter installed in the project that owns `file_path`.
///
/// The first ancestor holding a `package.json` decides the result: its
/// primary script, then its legacy script, otherwise `None`. Ancestors above
/// that directory are never consulted. Relative paths are resolved against
/// the current directory.
pub fn find_project_local_script(file_path: &Path) -> Option<PathBuf> {
    if file_path.is_absolute() {
        return find_project_local_script_from(file_path, Path::new(""));
    }
    match std::env::current_dir() {
        Ok(cwd) => find_project_local_script_from(file_path, &cwd),
        Err(e) => {
            warn!(path = %file_path.display(), error = %e, "Unable to resolve relative document path");
            None
        }
    }
}

/// Same as [`find_project_local_script`], resolving a relative `file_path` against `base_dir`.
pub fn find_project_local_script_from(file_path: &Path, base_dir: &Path) -> Option<PathBuf> {
    let file_path = base_dir.join(file_path);
    let mut current = file_path.parent();

    while let Some(dir) = current {
        if dir.join(PROJECT_MANIFEST).is_file() {
            for relative in [SCRIPT_RELATIVE_PATH, SCRIPT_RELATIVE_PATH_LEGACY] {
                let script = join_all(dir, relative);
                if script.is_file() {
                    debug!(script = %script.display(), "Using project-local formatter");
                    return Some(script);
                }
            }
            debug!(
                project = %dir.display(),
                "Project manifest found without a formatter install"
            );
            return None;
        }
        current = dir.parent();
    }

    None
}

// ============================================================================
// Executable Lookup
// ============================================================================

/// Scans the process `PATH` for a file called `name`.
pub fn find_executable_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_executable_in(name, &path_var)
}

/// Scans a PATH-style value for a file called `name`. First match wins.
pub fn find_executable_in(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// Host Layout
// ============================================================================

/// Directories the host application ships next to its own executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    exe_dir: PathBuf,
}

impl HostLayout {
    pub fn new(exe_dir: impl Into<PathBuf>) -> Self {
        Self {
            exe_dir: exe_dir.into(),
        }
    }

    /// Detects the layout from the running executable.
    ///
    /// Returns `None` (and logs) if the executable path cannot be determined.
    pub fn detect() -> Option<Self> {
        match std::env::current_exe() {
            Ok(exe) => exe.parent().map(Self::new),
            Err(e) => {
                warn!("Unable to get host executable directory: {}", e);
                None
            }
        }
    }

    pub fn exe_dir(&self) -> &Path {
        &self.exe_dir
    }

    /// `<exe_dir>/../../Web/External`, if the executable is nested deep enough.
    pub fn shared_runtime_dir(&self) -> Option<PathBuf> {
        let grandparent = self.exe_dir.parent()?.parent()?;
        Some(join_all(grandparent, SHARED_RUNTIME_SUBDIR))
    }

    pub fn bundled_tools_dir(&self) -> PathBuf {
        join_all(&self.exe_dir, BUNDLED_TOOLS_SUBDIR)
    }

    pub fn bundled_scm_dir(&self) -> PathBuf {
        self.bundled_tools_dir().join(BUNDLED_SCM_SUBDIR)
    }

    /// npm entry point shipped with the host's bundled tools.
    pub fn bundled_npm_cli(&self) -> PathBuf {
        join_all(&self.bundled_tools_dir(), NPM_CLI_RELATIVE_PATH)
    }
}

// ============================================================================
// Package Manager Lookup
// ============================================================================

/// Locates `npm-cli.js`.
///
/// Candidates, in order: the npm found on `path_var` (resolving symlinks and
/// both Windows and Unix prefix layouts), then the host's bundled copy.
pub fn find_package_manager_cli(
    layout: Option<&HostLayout>,
    path_var: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(npm) = path_var.and_then(|p| find_executable_in(NPM_EXECUTABLE, p)) {
        if let Some(cli) = npm_cli_near(&npm) {
            return Some(cli);
        }
        debug!(npm = %npm.display(), "npm found on PATH but npm-cli.js is not next to it");
    }

    let bundled = layout?.bundled_npm_cli();
    if bundled.is_file() {
        return Some(bundled);
    }

    None
}

fn npm_cli_near(npm: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = std::fs::canonicalize(npm) {
        if resolved.file_name() == Some(OsStr::new("npm-cli.js")) {
            return Some(resolved);
        }
    }

    let npm_dir = npm.parent()?;
    [NPM_CLI_RELATIVE_PATH, NPM_CLI_PREFIX_RELATIVE_PATH]
        .into_iter()
        .map(|relative| join_all(npm_dir, relative))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_tidyhost_temp_dir_contains_tidyhost() {
        let dir = get_tidyhost_temp_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with("tidyhost"));
    }

    #[test]
    fn test_private_install_is_deterministic() {
        let paths = ToolPaths::new("/var/cache/tidyhost");
        let key = VersionKey::new("3.3.3");

        let first = paths.private_install(&key);
        let second = paths.private_install(&key);

        assert_eq!(first, second);
        assert!(first.install_dir.starts_with("/var/cache/tidyhost"));
        assert!(first.executable.starts_with(&first.install_dir));
        assert!(first.executable.ends_with("node_modules/prettier/bin/prettier.cjs"));
    }

    #[test]
    fn test_private_install_dir_name_is_sanitized() {
        let paths = ToolPaths::new("/root");
        for raw in ["3.3.3", "npm:prettier@3", "../../etc", "a\\b:c@d"] {
            let install = paths.private_install(&VersionKey::new(raw));
            let name = install
                .install_dir
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string();

            assert!(
                !name.contains(['/', '\\', '@', ':']),
                "unsanitized directory name: {}",
                name
            );
            assert_eq!(install.install_dir.parent(), Some(Path::new("/root")));
        }
    }

    #[test]
    fn test_sanitize_dir_name() {
        assert_eq!(sanitize_dir_name("prettier@3.3.3"), "prettier_3.3.3");
        assert_eq!(sanitize_dir_name("a/b\\c:d"), "a_b_c_d");
    }

    #[test]
    fn test_private_install_readiness_follows_disk() {
        let temp = TempDir::new().unwrap();
        let install = ToolPaths::new(temp.path()).private_install(&VersionKey::fallback());
        assert!(!install.is_ready());

        touch(&install.executable);
        assert!(install.is_ready());

        fs::remove_dir_all(&install.install_dir).unwrap();
        assert!(!install.is_ready());
    }

    #[test]
    fn test_find_project_local_script_primary() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("a").join("b");
        touch(&project.join("package.json"));
        touch(&join_all(&project, SCRIPT_RELATIVE_PATH));

        let file = project.join("c").join("file.js");
        let found = find_project_local_script(&file);

        assert_eq!(found, Some(join_all(&project, SCRIPT_RELATIVE_PATH)));
    }

    #[test]
    fn test_find_project_local_script_legacy() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("package.json"));
        touch(&join_all(temp.path(), SCRIPT_RELATIVE_PATH_LEGACY));

        let found = find_project_local_script(&temp.path().join("src").join("index.ts"));
        assert_eq!(found, Some(join_all(temp.path(), SCRIPT_RELATIVE_PATH_LEGACY)));
    }

    #[test]
    fn test_find_project_local_script_stops_at_first_manifest() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("a");
        let inner = outer.join("b");

        // Outer project has a formatter, inner project only a manifest.
        touch(&outer.join("package.json"));
        touch(&join_all(&outer, SCRIPT_RELATIVE_PATH));
        touch(&inner.join("package.json"));

        let file = inner.join("c").join("file.js");
        assert_eq!(find_project_local_script(&file), None);
    }

    #[test]
    fn test_find_project_local_script_without_manifest() {
        let temp = TempDir::new().unwrap();
        // A script without a manifest next to it is not a project install.
        touch(&join_all(temp.path(), SCRIPT_RELATIVE_PATH));

        let file = temp.path().join("x").join("y.js");
        assert_eq!(find_project_local_script(&file), None);
    }

    #[test]
    fn test_find_project_local_script_relative_path_walks_up() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let src = project.join("src");
        touch(&project.join("package.json"));
        touch(&join_all(&project, SCRIPT_RELATIVE_PATH));
        fs::create_dir_all(&src).unwrap();

        let expected = Some(join_all(&project, SCRIPT_RELATIVE_PATH));
        assert_eq!(find_project_local_script_from(Path::new("a.js"), &src), expected);
        assert_eq!(
            find_project_local_script_from(Path::new("nested/b.ts"), &src),
            expected
        );
        // Absolute paths ignore the base directory.
        assert_eq!(
            find_project_local_script_from(&src.join("a.js"), Path::new("/elsewhere")),
            expected
        );
    }

    #[test]
    fn test_find_project_local_script_at_root() {
        assert_eq!(find_project_local_script(Path::new("/")), None);
    }

    #[test]
    fn test_find_executable_in_first_match_wins() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        touch(&second.join("tool"));
        touch(&first.join("tool"));

        let path_var = std::env::join_paths([&first, &second]).unwrap();
        assert_eq!(find_executable_in("tool", &path_var), Some(first.join("tool")));
        assert_eq!(find_executable_in("missing", &path_var), None);
    }

    #[test]
    fn test_find_executable_in_skips_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a").join("tool")).unwrap();
        touch(&temp.path().join("b").join("tool"));

        let path_var = std::env::join_paths([temp.path().join("a"), temp.path().join("b")]).unwrap();
        assert_eq!(
            find_executable_in("tool", &path_var),
            Some(temp.path().join("b").join("tool"))
        );
    }

    #[test]
    fn test_host_layout_dirs() {
        let layout = HostLayout::new("/opt/host/app/bin");
        assert_eq!(
            layout.shared_runtime_dir(),
            Some(PathBuf::from("/opt/host/Web/External"))
        );
        assert!(layout.bundled_scm_dir().starts_with(layout.bundled_tools_dir()));
        assert!(layout.bundled_npm_cli().ends_with("node_modules/npm/bin/npm-cli.js"));
        assert_eq!(HostLayout::new("/").shared_runtime_dir(), None);
    }

    #[test]
    fn test_find_package_manager_cli_prefers_path() {
        let temp = TempDir::new().unwrap();
        let npm_dir = temp.path().join("node");
        touch(&npm_dir.join(NPM_EXECUTABLE));
        let cli = join_all(&npm_dir, NPM_CLI_RELATIVE_PATH);
        touch(&cli);

        let layout = HostLayout::new(temp.path().join("host"));
        touch(&layout.bundled_npm_cli());

        let path_var = std::env::join_paths([&npm_dir]).unwrap();
        let found = find_package_manager_cli(Some(&layout), Some(&path_var));
        assert_eq!(found, Some(cli));
    }

    #[test]
    fn test_find_package_manager_cli_unix_prefix_layout() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        touch(&bin.join(NPM_EXECUTABLE));
        touch(&join_all(temp.path(), &["lib", "node_modules", "npm", "bin", "npm-cli.js"]));

        let path_var = std::env::join_paths([&bin]).unwrap();
        let found = find_package_manager_cli(None, Some(&path_var)).unwrap();
        assert!(found.ends_with("npm-cli.js"));
        assert!(found.is_file());
    }

    #[test]
    fn test_find_package_manager_cli_falls_back_to_bundled() {
        let temp = TempDir::new().unwrap();
        let layout = HostLayout::new(temp.path());
        touch(&layout.bundled_npm_cli());

        let empty = std::env::join_paths([temp.path().join("nothing-here")]).unwrap();
        let found = find_package_manager_cli(Some(&layout), Some(&empty));
        assert_eq!(found, Some(layout.bundled_npm_cli()));
    }

    #[test]
    fn test_find_package_manager_cli_none() {
        let temp = TempDir::new().unwrap();
        let layout = HostLayout::new(temp.path());
        assert_eq!(find_package_manager_cli(Some(&layout), None), None);
        assert_eq!(find_package_manager_cli(None, None), None);
    }
}
