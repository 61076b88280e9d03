//! Fingerprint of a single build unit.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::content::{ContentHash, ContentHasher, hash_bytes, hash_unordered};
use super::HashError;
use crate::consts::CACHE_VERSION;
use crate::graph::{CoreDataModel, GraphDependency, SdkStatus, Target, TargetId};

/// Per-run inputs that are not part of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashContext {
  /// Build configuration, e.g. `Debug`.
  pub configuration: String,
  /// Toolchain/language version markers mixed into every fingerprint.
  pub additional_strings: Vec<String>,
}

impl HashContext {
  pub fn new(configuration: impl Into<String>) -> Self {
    Self {
      configuration: configuration.into(),
      additional_strings: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetContentHash {
  pub hash: ContentHash,
  /// Hash of each input category, for diagnosing unexpected misses.
  pub subhashes: BTreeMap<&'static str, ContentHash>,
}

pub struct TargetContentHasher<'a> {
  content: &'a ContentHasher,
}

impl<'a> TargetContentHasher<'a> {
  pub fn new(content: &'a ContentHasher) -> Self {
    Self { content }
  }

  /// Hashes `target` given the fingerprints of its direct build-unit dependencies.
  ///
  /// Every category is order-independent internally; categories are combined in
  /// a fixed order.
  pub fn hash(
    &self,
    id: &TargetId,
    target: &Target,
    dependencies: &[GraphDependency],
    dependency_hashes: &BTreeMap<TargetId, ContentHash>,
    context: &HashContext,
  ) -> Result<TargetContentHash, HashError> {
    let categories: [(&'static str, ContentHash); 12] = [
      ("version", hash_bytes(CACHE_VERSION.as_bytes())),
      ("name", hash_bytes(target.name.as_bytes())),
      ("product", hash_bytes(target.product.as_str().as_bytes())),
      ("product_name", hash_bytes(target.product_name().as_bytes())),
      ("platform", hash_bytes(target.platform.as_str().as_bytes())),
      ("configuration", hash_bytes(context.configuration.as_bytes())),
      ("sources", self.sources(target)?),
      ("resources", self.resources(target)?),
      ("core_data_models", self.core_data_models(&target.core_data_models)?),
      (
        "settings",
        hash_unordered(target.settings.iter().map(|(key, value)| format!("{key}={value}"))),
      ),
      ("dependencies", self.dependencies(id, dependencies, dependency_hashes)?),
      ("additional_strings", hash_unordered(&context.additional_strings)),
    ];

    let mut hasher = Sha256::new();
    for (category, hash) in &categories {
      hasher.update(category.as_bytes());
      hasher.update(b"=");
      hasher.update(hash.0.as_bytes());
      hasher.update(b"\n");
    }

    Ok(TargetContentHash {
      hash: ContentHash(hex::encode(hasher.finalize())),
      subhashes: categories.into_iter().collect(),
    })
  }

  /// Source content and flags; the path itself does not participate.
  fn sources(&self, target: &Target) -> Result<ContentHash, HashError> {
    let items = target
      .sources
      .iter()
      .map(|source| {
        let content = self.content.hash_path(&source.path)?;
        Ok(format!("{}:{}", content, source.compiler_flags.as_deref().unwrap_or_default()))
      })
      .collect::<Result<Vec<_>, HashError>>()?;
    Ok(hash_unordered(items))
  }

  fn resources(&self, target: &Target) -> Result<ContentHash, HashError> {
    let items = target
      .resources
      .iter()
      .map(|resource| self.content.hash_path(resource.path()).map(|hash| hash.0))
      .collect::<Result<Vec<_>, HashError>>()?;
    Ok(hash_unordered(items))
  }

  /// Active version content plus the names of all versions.
  fn core_data_models(&self, models: &[CoreDataModel]) -> Result<ContentHash, HashError> {
    let items = models
      .iter()
      .map(|model| {
        let active = model
          .versions
          .iter()
          .find(|version| version.file_stem().is_some_and(|stem| stem == model.current_version.as_str()))
          .cloned()
          .unwrap_or_else(|| model.path.join(format!("{}.xcdatamodel", model.current_version)));
        let content = self.content.hash_path(&active)?;
        let mut names: Vec<String> = model
          .versions
          .iter()
          .filter_map(|version| version.file_name())
          .map(|name| name.to_string_lossy().into_owned())
          .collect();
        names.sort();
        Ok(format!("{}:{}:{}", content, model.current_version, names.join(",")))
      })
      .collect::<Result<Vec<_>, HashError>>()?;
    Ok(hash_unordered(items))
  }

  fn dependencies(
    &self,
    id: &TargetId,
    dependencies: &[GraphDependency],
    dependency_hashes: &BTreeMap<TargetId, ContentHash>,
  ) -> Result<ContentHash, HashError> {
    let items = dependencies
      .iter()
      .map(|dependency| match dependency {
        GraphDependency::Target { path, name } => {
          let dependency_id = TargetId::new(path.clone(), name.clone());
          dependency_hashes
            .get(&dependency_id)
            .map(|hash| format!("target:{hash}"))
            .ok_or_else(|| HashError::MissingDependencyHash {
              target: id.clone(),
              dependency: dependency_id,
            })
        }
        GraphDependency::Framework { .. }
        | GraphDependency::XcFramework { .. }
        | GraphDependency::Library { .. }
        | GraphDependency::Bundle { .. }
        | GraphDependency::Macro { .. } => self.precompiled(dependency).map(|hash| format!("precompiled:{hash}")),
        GraphDependency::Sdk { name, status, .. } => Ok(format!(
          "sdk:{}:{}",
          name,
          match status {
            SdkStatus::Required => "required",
            SdkStatus::Optional => "optional",
          }
        )),
        GraphDependency::Package { product } => Ok(format!("package:{product}")),
      })
      .collect::<Result<Vec<_>, HashError>>()?;
    Ok(hash_unordered(items))
  }

  /// Artifact content, plus the content of anything an xcframework nests.
  fn precompiled(&self, dependency: &GraphDependency) -> Result<ContentHash, HashError> {
    let Some(path) = dependency.path() else {
      return Ok(hash_bytes(dependency.to_string().as_bytes()));
    };
    let own = self.content.hash_path(path)?;
    let nested = dependency.nested_dependencies();
    if nested.is_empty() {
      return Ok(own);
    }
    let nested = nested
      .iter()
      .map(|inner| self.precompiled(inner).map(|hash| hash.0))
      .collect::<Result<Vec<_>, HashError>>()?;
    Ok(hash_unordered([own.0, hash_unordered(nested).0]))
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use super::*;
  use crate::graph::{Product, ResourceFileElement, SourceFile};
  use crate::platform::Platform;

  fn framework(root: &Path, name: &str, sources: &[&str]) -> Target {
    let mut target = Target::new(name, Product::Framework, Platform::Ios);
    target.sources = sources.iter().map(|source| SourceFile::new(root.join(source))).collect();
    target
  }

  fn hash(target: &Target) -> TargetContentHash {
    let content = ContentHasher::new();
    TargetContentHasher::new(&content)
      .hash(
        &TargetId::new("/p", target.name.clone()),
        target,
        &[],
        &BTreeMap::new(),
        &HashContext::new("Debug"),
      )
      .unwrap()
  }

  fn fixture() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("a.swift"), "struct A {}").unwrap();
    fs::write(temp.path().join("b.swift"), "struct B {}").unwrap();
    fs::write(temp.path().join("c.swift"), "struct C {}").unwrap();
    temp
  }

  #[test]
  fn source_order_does_not_matter() {
    let temp = fixture();
    let forward = framework(temp.path(), "Core", &["a.swift", "b.swift"]);
    let reverse = framework(temp.path(), "Core", &["b.swift", "a.swift"]);
    assert_eq!(hash(&forward).hash, hash(&reverse).hash);
  }

  #[test]
  fn source_content_matters() {
    let temp = fixture();
    let ab = framework(temp.path(), "Core", &["a.swift", "b.swift"]);
    let ac = framework(temp.path(), "Core", &["a.swift", "c.swift"]);
    assert_ne!(hash(&ab).hash, hash(&ac).hash);
  }

  #[test]
  fn compiler_flags_matter() {
    let temp = fixture();
    let plain = framework(temp.path(), "Core", &["a.swift"]);
    let mut flagged = plain.clone();
    flagged.sources[0].compiler_flags = Some("-O".to_string());
    assert_ne!(hash(&plain).hash, hash(&flagged).hash);
  }

  #[test]
  fn platform_matters() {
    let temp = fixture();
    let ios = framework(temp.path(), "Core", &["a.swift"]);
    let mut macos = ios.clone();
    macos.platform = Platform::Macos;

    let (ios, macos) = (hash(&ios), hash(&macos));
    assert_ne!(ios.hash, macos.hash);
    assert_eq!(ios.subhashes["sources"], macos.subhashes["sources"]);
    assert_ne!(ios.subhashes["platform"], macos.subhashes["platform"]);
  }

  #[test]
  fn resource_content_matters() {
    let temp = fixture();
    let assets = temp.path().join("Assets");
    fs::create_dir(&assets).unwrap();
    fs::write(assets.join("icon.png"), "png-1").unwrap();

    let mut target = framework(temp.path(), "Core", &["a.swift"]);
    target.resources.push(ResourceFileElement::Folder { path: assets.clone() });
    let before = hash(&target).hash;

    fs::write(assets.join("icon.png"), "png-2").unwrap();
    assert_ne!(before, hash(&target).hash);
  }

  #[test]
  fn resource_order_does_not_matter() {
    let temp = fixture();
    let assets = temp.path().join("Assets");
    fs::create_dir(&assets).unwrap();
    fs::write(assets.join("icon.png"), "png").unwrap();
    fs::write(temp.path().join("Strings.json"), "{}").unwrap();
    fs::write(temp.path().join("Info.plist"), "<plist/>").unwrap();

    let resources = vec![
      ResourceFileElement::Folder { path: assets },
      ResourceFileElement::File {
        path: temp.path().join("Strings.json"),
      },
      ResourceFileElement::File {
        path: temp.path().join("Info.plist"),
      },
    ];
    let mut forward = framework(temp.path(), "Core", &["a.swift"]);
    forward.resources = resources.clone();
    let mut reverse = forward.clone();
    reverse.resources = resources.into_iter().rev().collect();
    let mut rotated = forward.clone();
    rotated.resources.rotate_left(1);

    let expected = hash(&forward);
    assert_eq!(expected.hash, hash(&reverse).hash);
    assert_eq!(expected.hash, hash(&rotated).hash);
    assert_eq!(expected.subhashes["resources"], hash(&reverse).subhashes["resources"]);
  }

  #[test]
  fn core_data_active_version_matters() {
    let temp = fixture();
    let model = temp.path().join("Model.xcdatamodeld");
    fs::create_dir_all(model.join("V1.xcdatamodel")).unwrap();
    fs::create_dir_all(model.join("V2.xcdatamodel")).unwrap();
    fs::write(model.join("V1.xcdatamodel/contents"), "v1").unwrap();
    fs::write(model.join("V2.xcdatamodel/contents"), "v2").unwrap();

    let mut target = framework(temp.path(), "Core", &[]);
    target.core_data_models.push(CoreDataModel {
      path: model.clone(),
      versions: vec![model.join("V1.xcdatamodel"), model.join("V2.xcdatamodel")],
      current_version: "V1".to_string(),
    });
    let v1 = hash(&target).hash;
    target.core_data_models[0].current_version = "V2".to_string();
    assert_ne!(v1, hash(&target).hash);
  }

  #[test]
  fn dependency_hash_participates() {
    let temp = fixture();
    let target = framework(temp.path(), "App", &["a.swift"]);
    let id = TargetId::new("/p", "App");
    let dep = TargetId::new("/p", "Core");
    let deps = vec![GraphDependency::target(&dep)];
    let content = ContentHasher::new();
    let hasher = TargetContentHasher::new(&content);
    let context = HashContext::new("Debug");

    let one: BTreeMap<_, _> = [(dep.clone(), ContentHash("1".into()))].into_iter().collect();
    let two: BTreeMap<_, _> = [(dep.clone(), ContentHash("2".into()))].into_iter().collect();
    let first = hasher.hash(&id, &target, &deps, &one, &context).unwrap();
    let second = hasher.hash(&id, &target, &deps, &two, &context).unwrap();
    assert_ne!(first.hash, second.hash);

    let err = hasher.hash(&id, &target, &deps, &BTreeMap::new(), &context).unwrap_err();
    assert!(matches!(err, HashError::MissingDependencyHash { .. }));
  }

  #[test]
  fn nested_xcframework_content_participates() {
    let temp = fixture();
    let outer = temp.path().join("A.xcframework");
    let inner = temp.path().join("B.framework");
    fs::create_dir_all(&outer).unwrap();
    fs::create_dir_all(&inner).unwrap();
    fs::write(outer.join("Info.plist"), "a").unwrap();
    fs::write(inner.join("B"), "b-1").unwrap();

    let target = framework(temp.path(), "App", &["a.swift"]);
    let id = TargetId::new("/p", "App");
    let deps = vec![GraphDependency::XcFramework {
      path: outer,
      libraries: vec![],
      linking: crate::graph::Linking::Dynamic,
      dependencies: vec![GraphDependency::Framework {
        path: inner.clone(),
        binary_path: inner.join("B"),
        dsym_path: None,
        bcsymbolmap_paths: vec![],
        linking: crate::graph::Linking::Dynamic,
        architectures: Default::default(),
      }],
    }];
    let context = HashContext::new("Debug");
    let first = TargetContentHasher::new(&ContentHasher::new())
      .hash(&id, &target, &deps, &BTreeMap::new(), &context)
      .unwrap();

    fs::write(inner.join("B"), "b-2").unwrap();
    let second = TargetContentHasher::new(&ContentHasher::new())
      .hash(&id, &target, &deps, &BTreeMap::new(), &context)
      .unwrap();
    assert_ne!(first.subhashes["dependencies"], second.subhashes["dependencies"]);
  }

  #[test]
  fn configuration_and_markers_matter() {
    let temp = fixture();
    let target = framework(temp.path(), "Core", &["a.swift"]);
    let content = ContentHasher::new();
    let hasher = TargetContentHasher::new(&content);
    let id = TargetId::new("/p", "Core");

    let debug = HashContext::new("Debug");
    let release = HashContext::new("Release");
    let mut swift6 = HashContext::new("Debug");
    swift6.additional_strings.push("swift-6.0".to_string());

    let debug = hasher.hash(&id, &target, &[], &BTreeMap::new(), &debug).unwrap().hash;
    let release = hasher.hash(&id, &target, &[], &BTreeMap::new(), &release).unwrap().hash;
    let swift6 = hasher.hash(&id, &target, &[], &BTreeMap::new(), &swift6).unwrap().hash;
    assert_ne!(debug, release);
    assert_ne!(debug, swift6);
  }
}
