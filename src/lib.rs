//! Feature-pack installation pipeline.
//!
//! Assembles a server distribution from an ordered list of feature packs:
//!
//! - **Version registry** - artifact versions and task properties per pack and merged
//! - **Descriptor rewriting** - `module.xml` templates resolved for thin or full installs
//! - **Package tasks** - copy, delete, transform and mkdir operations declared per package
//! - **Finalize scripts** - external CLI runs with diagnostic capture on failure
//! - **Artifact store** - content-addressed local cache usable as an artifact resolver
//!
//! # Architecture
//!
//! ```text
//! Installer::install
//!     │
//!     ├── versions      load per-pack properties, freeze the registry
//!     ├── staging       mirror module templates into the staged tree
//!     ├── executor      run processing-phase tasks, queue finalizing ones
//!     ├── module_xml    rewrite descriptors from their last owner
//!     ├── layers        merge modules/layers.conf
//!     ├── configgen     generate configurations once
//!     ├── scripts       run finalize.cli per pack
//!     └── executor      drain the finalizing queue, then example configs
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use featurepack_installer::executor::xslt::XsltprocCompiler;
//! use featurepack_installer::configgen::ProcessConfigGenerator;
//! use featurepack_installer::module_xml::NoIndexer;
//! use featurepack_installer::provider::{Layout, MavenRepository};
//! use featurepack_installer::{InstallRequest, Installer};
//!
//! let layout = Layout::load("layout.toml".as_ref())?;
//! let repo = MavenRepository::new("/var/cache/m2");
//! let xslt = XsltprocCompiler::locate()?;
//! let generator = ProcessConfigGenerator::locate()?;
//!
//! let request = InstallRequest::new(layout.feature_packs, "/opt/server");
//! let report = Installer::new(&repo, &NoIndexer, &xslt, &generator).install(&request)?;
//! println!("{} descriptors rewritten", report.descriptors_rewritten);
//! ```

pub mod artifact_store;
pub mod config;
pub mod configgen;
pub mod error;
pub mod executor;
pub mod installer;
pub mod layers;
pub mod module_xml;
pub mod provider;
pub mod schema;
pub mod scripts;
pub mod staging;
pub mod substitute;
pub mod tasks;
pub mod versions;

pub use config::{InstallOptions, InstallerConfig};
pub use error::InstallError;
pub use installer::{InstallReport, InstallRequest, InstallScope, Installer};
