//! Build units, precompiled artifacts, and the references between them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::platform::arch::Architecture;

/// Identity of a build unit: the project it is declared in plus its name.
///
/// Equality, ordering and hashing only look at identity, never at the unit's
/// content, so units can be referenced before their dependencies are known.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId {
  pub path: PathBuf,
  pub name: String,
}

impl TargetId {
  pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      name: name.into(),
    }
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.path.display())
  }
}

/// What a build unit produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
  App,
  StaticLibrary,
  DynamicLibrary,
  Framework,
  StaticFramework,
  UnitTests,
  UiTests,
  Bundle,
  AppExtension,
  CommandLineTool,
  Macro,
}

impl Product {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::App => "app",
      Self::StaticLibrary => "static_library",
      Self::DynamicLibrary => "dynamic_library",
      Self::Framework => "framework",
      Self::StaticFramework => "static_framework",
      Self::UnitTests => "unit_tests",
      Self::UiTests => "ui_tests",
      Self::Bundle => "bundle",
      Self::AppExtension => "app_extension",
      Self::CommandLineTool => "command_line_tool",
      Self::Macro => "macro",
    }
  }

  /// Products that can be replaced by a prebuilt binary.
  pub fn is_cacheable(&self) -> bool {
    matches!(
      self,
      Self::Framework | Self::StaticFramework | Self::StaticLibrary | Self::DynamicLibrary | Self::Bundle | Self::Macro
    )
  }
}

impl fmt::Display for Product {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// How a binary is linked into its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linking {
  Static,
  Dynamic,
}

impl fmt::Display for Linking {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Static => write!(f, "static"),
      Self::Dynamic => write!(f, "dynamic"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
  pub path: PathBuf,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub compiler_flags: Option<String>,
}

impl SourceFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      compiler_flags: None,
    }
  }
}

/// A resource is either a single file or a folder reference copied as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceFileElement {
  File { path: PathBuf },
  Folder { path: PathBuf },
}

impl ResourceFileElement {
  pub fn path(&self) -> &Path {
    match self {
      Self::File { path } | Self::Folder { path } => path,
    }
  }
}

/// A versioned data model (`.xcdatamodeld`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDataModel {
  pub path: PathBuf,
  #[serde(default)]
  pub versions: Vec<PathBuf>,
  pub current_version: String,
}

/// Whether a linked SDK is required at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdkStatus {
  #[default]
  Required,
  Optional,
}

/// Where an SDK lives: the OS itself or the developer directory (e.g. XCTest).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdkSource {
  #[default]
  System,
  Developer,
}

/// A dependency as declared by the project description, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetDependency {
  /// Another unit of the same project.
  Target { name: String },
  /// A unit of another project.
  Project { path: PathBuf, target: String },
  Framework { path: PathBuf },
  Xcframework {
    path: PathBuf,
    /// Frameworks and xcframeworks this one links against.
    #[serde(default)]
    dependencies: Vec<PathBuf>,
  },
  Library {
    path: PathBuf,
    #[serde(default)]
    public_headers: Option<PathBuf>,
  },
  Sdk {
    name: String,
    #[serde(default)]
    status: SdkStatus,
    #[serde(default)]
    source: SdkSource,
  },
  Package { product: String },
}

/// A compilable/linkable module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
  pub name: String,
  pub product: Product,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_name: Option<String>,
  pub platform: Platform,
  #[serde(default)]
  pub sources: Vec<SourceFile>,
  #[serde(default)]
  pub resources: Vec<ResourceFileElement>,
  #[serde(default)]
  pub core_data_models: Vec<CoreDataModel>,
  #[serde(default)]
  pub settings: BTreeMap<String, String>,
  #[serde(default)]
  pub dependencies: Vec<TargetDependency>,
  /// Marked by mappers; pruned units are removed by tree-shaking.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub prune: bool,
}

impl Target {
  pub fn new(name: impl Into<String>, product: Product, platform: Platform) -> Self {
    Self {
      name: name.into(),
      product,
      product_name: None,
      platform,
      sources: Vec::new(),
      resources: Vec::new(),
      core_data_models: Vec::new(),
      settings: BTreeMap::new(),
      dependencies: Vec::new(),
      prune: false,
    }
  }

  /// Name of the built product; defaults to the unit name.
  pub fn product_name(&self) -> &str {
    self.product_name.as_deref().unwrap_or(&self.name)
  }

  /// Rewrites every relative input path so it is anchored at `root`.
  pub fn resolve_paths(&mut self, root: &Path) {
    let anchor = |path: &mut PathBuf| {
      if path.is_relative() {
        *path = root.join(&*path);
      }
    };
    for source in &mut self.sources {
      anchor(&mut source.path);
    }
    for resource in &mut self.resources {
      match resource {
        ResourceFileElement::File { path } | ResourceFileElement::Folder { path } => anchor(path),
      }
    }
    for model in &mut self.core_data_models {
      anchor(&mut model.path);
      for version in &mut model.versions {
        anchor(version);
      }
    }
    for dependency in &mut self.dependencies {
      match dependency {
        TargetDependency::Xcframework { path, dependencies } => {
          anchor(path);
          dependencies.iter_mut().for_each(anchor);
        }
        TargetDependency::Project { path, .. }
        | TargetDependency::Framework { path }
        | TargetDependency::Library { path, .. } => anchor(path),
        TargetDependency::Target { .. } | TargetDependency::Sdk { .. } | TargetDependency::Package { .. } => {}
      }
    }
  }
}

/// One platform slice inside an `.xcframework`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct XcFrameworkLibrary {
  pub identifier: String,
  pub path: PathBuf,
}

/// A node of the resolved dependency graph.
///
/// Build units are referenced by identity; every other variant is a precompiled
/// artifact that is never built in this run. Precompiled nodes are leaves except
/// for xcframeworks, which carry the precompiled nodes they link against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphDependency {
  Target {
    path: PathBuf,
    name: String,
  },
  Framework {
    path: PathBuf,
    binary_path: PathBuf,
    dsym_path: Option<PathBuf>,
    bcsymbolmap_paths: Vec<PathBuf>,
    linking: Linking,
    architectures: BTreeSet<Architecture>,
  },
  XcFramework {
    path: PathBuf,
    libraries: Vec<XcFrameworkLibrary>,
    linking: Linking,
    /// Framework and xcframework nodes; mirrored as graph edges.
    dependencies: Vec<GraphDependency>,
  },
  Library {
    path: PathBuf,
    public_headers: Option<PathBuf>,
    linking: Linking,
    architectures: BTreeSet<Architecture>,
  },
  Sdk {
    name: String,
    path: PathBuf,
    status: SdkStatus,
    source: SdkSource,
  },
  Package {
    product: String,
  },
  /// A prebuilt resource bundle, embedded rather than linked.
  Bundle {
    path: PathBuf,
  },
  /// A prebuilt compiler plugin, only needed while compiling dependents.
  Macro {
    path: PathBuf,
  },
}

impl GraphDependency {
  pub fn target(id: &TargetId) -> Self {
    Self::Target {
      path: id.path.clone(),
      name: id.name.clone(),
    }
  }

  pub fn target_id(&self) -> Option<TargetId> {
    match self {
      Self::Target { path, name } => Some(TargetId::new(path.clone(), name.clone())),
      _ => None,
    }
  }

  pub fn is_precompiled(&self) -> bool {
    matches!(
      self,
      Self::Framework { .. } | Self::XcFramework { .. } | Self::Library { .. } | Self::Bundle { .. } | Self::Macro { .. }
    )
  }

  /// Frameworks and xcframeworks, the only kinds an xcframework can nest.
  pub fn is_bundled_binary(&self) -> bool {
    matches!(self, Self::Framework { .. } | Self::XcFramework { .. })
  }

  /// Nested precompiled dependencies of an xcframework; empty for everything else.
  pub fn nested_dependencies(&self) -> &[GraphDependency] {
    match self {
      Self::XcFramework { dependencies, .. } => dependencies,
      _ => &[],
    }
  }

  pub fn linking(&self) -> Option<Linking> {
    match self {
      Self::Framework { linking, .. } | Self::XcFramework { linking, .. } | Self::Library { linking, .. } => {
        Some(*linking)
      }
      _ => None,
    }
  }

  /// Whether this stays a dependency of a cached artifact that replaces its dependent.
  ///
  /// Bundled binaries, resource bundles and SDKs are still needed at link or embed
  /// time; libraries, macros, packages and build units were consumed when the
  /// artifact was built.
  pub fn stays_attached_to_artifact(&self) -> bool {
    matches!(
      self,
      Self::Framework { .. } | Self::XcFramework { .. } | Self::Bundle { .. } | Self::Sdk { .. }
    )
  }

  /// Filesystem location of precompiled and SDK nodes.
  pub fn path(&self) -> Option<&Path> {
    match self {
      Self::Framework { path, .. }
      | Self::XcFramework { path, .. }
      | Self::Library { path, .. }
      | Self::Bundle { path }
      | Self::Macro { path }
      | Self::Sdk { path, .. } => Some(path),
      Self::Target { .. } | Self::Package { .. } => None,
    }
  }
}

impl fmt::Display for GraphDependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Target { path, name } => write!(f, "target {} ({})", name, path.display()),
      Self::Framework { path, .. } => write!(f, "framework {}", path.display()),
      Self::XcFramework { path, .. } => write!(f, "xcframework {}", path.display()),
      Self::Library { path, .. } => write!(f, "library {}", path.display()),
      Self::Sdk { name, .. } => write!(f, "sdk {}", name),
      Self::Package { product } => write!(f, "package {}", product),
      Self::Bundle { path } => write!(f, "bundle {}", path.display()),
      Self::Macro { path } => write!(f, "macro {}", path.display()),
    }
  }
}
