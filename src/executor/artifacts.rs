//! Artifact handler: Task::CopyArtifact, plus archive expansion.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, MAIN_SEPARATOR};
use tracing::debug;

use crate::provider::ArtifactResolver;
use crate::schema::{extract_schemas, SchemaGroups};
use crate::staging::{copy_file, ensure_dir};
use crate::versions::{resolve, VersionMap};

/// Handle Task::CopyArtifact.
///
/// A `to_location` ending with `/` names a directory; the artifact's file
/// name is appended. With `extract`, the archive is expanded into
/// `to_location` instead.
#[allow(clippy::too_many_arguments)]
pub fn handle_copy_artifact(
    staged: &Path,
    versions: &VersionMap,
    artifacts: &dyn ArtifactResolver,
    schema_groups: &SchemaGroups,
    artifact: &str,
    to_location: &str,
    extract: bool,
    optional: bool,
) -> Result<()> {
    let Some(coords) = resolve(versions, artifact, optional)? else {
        debug!(artifact, "optional artifact not in version map, skipping");
        return Ok(());
    };
    debug!(%coords, "resolving artifact");
    let src = artifacts.resolve(&coords)?;

    let mut target = staged.join(to_location);
    if to_location.ends_with('/') || to_location.ends_with(MAIN_SEPARATOR) {
        let name = src
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| coords.file_name().into());
        target.push(name);
    }

    let copied = if extract {
        extract_archive(&src, &target)
    } else {
        copy_file(&src, &target)
    };
    copied.with_context(|| format!("copying artifact {coords} to '{}'", target.display()))?;

    if schema_groups.contains(&coords.group_id) {
        extract_schemas(&src, staged)?;
    }
    Ok(())
}

/// Expand `archive` into `target_dir`: `.tar.zst` and `.tar` through `tar`,
/// anything else as a zip (jar, war, zip).
pub fn extract_archive(archive: &Path, target_dir: &Path) -> Result<()> {
    ensure_dir(target_dir)?;
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let file = File::open(archive)
        .with_context(|| format!("opening archive '{}'", archive.display()))?;

    if name.ends_with(".tar.zst") {
        let decoder = zstd::stream::Decoder::new(file)?;
        tar::Archive::new(decoder)
            .unpack(target_dir)
            .with_context(|| format!("unpacking '{}'", archive.display()))?;
    } else if name.ends_with(".tar") {
        tar::Archive::new(file)
            .unpack(target_dir)
            .with_context(|| format!("unpacking '{}'", archive.display()))?;
    } else {
        zip::ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(target_dir))
            .with_context(|| format!("extracting '{}'", archive.display()))?;
    }
    debug!(
        archive = %archive.display(),
        target = %target_dir.display(),
        "extracted archive"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallError;
    use crate::provider::MavenRepository;
    use crate::schema::tests::write_zip;
    use crate::versions::ArtifactCoords;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        staging: PathBuf,
        repo: MavenRepository,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let repo = MavenRepository::new(temp.path().join("repo"));
        Fixture {
            _temp: temp,
            staging,
            repo,
        }
    }

    fn install(repo: &MavenRepository, coords: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = repo.artifact_path(&ArtifactCoords::parse(coords).unwrap());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_zip(&path, entries);
        path
    }

    fn versions() -> VersionMap {
        [("org.x:client", "org.x:client:1.0::jar")].into_iter().collect()
    }

    #[test]
    fn test_copy_artifact_into_directory() {
        let f = fixture();
        install(&f.repo, "org.x:client:1.0", &[("A.class", "a")]);

        handle_copy_artifact(
            &f.staging,
            &versions(),
            &f.repo,
            &SchemaGroups::new(),
            "org.x:client",
            "bin/client/",
            false,
            false,
        )
        .unwrap();

        assert!(f.staging.join("bin/client/client-1.0.jar").is_file());
    }

    #[test]
    fn test_copy_artifact_to_explicit_name_with_schemas() {
        let f = fixture();
        install(
            &f.repo,
            "org.x:client:1.0",
            &[("schema/client_1_0.xsd", "<xs:schema/>")],
        );
        let mut groups = SchemaGroups::new();
        groups.insert("org.x");

        handle_copy_artifact(
            &f.staging,
            &versions(),
            &f.repo,
            &groups,
            "${org.x:client}",
            "bin/client.jar",
            false,
            false,
        )
        .unwrap();

        assert!(f.staging.join("bin/client.jar").is_file());
        assert!(f.staging.join("docs/schema/client_1_0.xsd").is_file());
    }

    #[test]
    fn test_copy_artifact_extracts() {
        let f = fixture();
        install(
            &f.repo,
            "org.x:client:1.0",
            &[("lib/one.jar", "1"), ("README.txt", "read me")],
        );

        handle_copy_artifact(
            &f.staging,
            &versions(),
            &f.repo,
            &SchemaGroups::new(),
            "org.x:client",
            "tools",
            true,
            false,
        )
        .unwrap();

        assert!(f.staging.join("tools/lib/one.jar").is_file());
        assert_eq!(
            fs::read_to_string(f.staging.join("tools/README.txt")).unwrap(),
            "read me"
        );
    }

    #[test]
    fn test_copy_artifact_optional_absent_is_noop() {
        let f = fixture();
        handle_copy_artifact(
            &f.staging,
            &VersionMap::new(),
            &f.repo,
            &SchemaGroups::new(),
            "org.x:absent",
            "lib/",
            false,
            true,
        )
        .unwrap();
        assert_eq!(fs::read_dir(&f.staging).unwrap().count(), 0);

        let err = handle_copy_artifact(
            &f.staging,
            &VersionMap::new(),
            &f.repo,
            &SchemaGroups::new(),
            "org.x:absent",
            "lib/",
            false,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            InstallError::find(&err),
            Some(InstallError::UnresolvedArtifactCoordinate { .. })
        ));
    }

    #[test]
    fn test_extract_tar_zst() {
        let temp = TempDir::new().unwrap();
        let src_dir = temp.path().join("src");
        fs::create_dir_all(src_dir.join("bin")).unwrap();
        fs::write(src_dir.join("bin/tool"), "tool").unwrap();

        let archive = temp.path().join("bundle.tar.zst");
        let out = File::create(&archive).unwrap();
        let encoder = zstd::stream::Encoder::new(out, 3).unwrap();
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &src_dir).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let target = temp.path().join("target");
        extract_archive(&archive, &target).unwrap();

        assert_eq!(fs::read_to_string(target.join("bin/tool")).unwrap(), "tool");
    }
}
