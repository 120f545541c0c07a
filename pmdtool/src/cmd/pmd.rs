use std::path::{Path, PathBuf};

use anyhow::Result;
use argh::FromArgs;
use pmdlib::{
    format::pmd::{scene_transform, PmdModel},
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Debug)]
/// process PMD files
#[argh(subcommand, name = "pmd")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// displays PMD file information
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input file
    input: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
    }
}

fn info(args: InfoArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let model = PmdModel::slice(&data)?;

    let armature_name = format!("{}_arm", file_stem(&args.input));
    log::info!("Armature {} ({} bones)", armature_name, model.bones.len());
    for bone in &model.bones {
        let head = bone.head();
        let parent = match model.bone_parent(bone.index) {
            Some(parent) => model.bones[parent].name.as_str(),
            None => "<none>",
        };
        log::info!(
            "  [{}] {} (parent {}) head ({:.3}, {:.3}, {:.3})",
            bone.index,
            bone.name,
            parent,
            head.x,
            head.y,
            head.z
        );
    }
    for mesh in &model.meshes {
        log::info!(
            "Mesh {}: {} vertices, {} UVs, {} triangles",
            mesh.name,
            mesh.vertices.len(),
            mesh.uvs.len(),
            mesh.triangles.len()
        );
    }
    log::debug!("Root placement fixup: {:?}", scene_transform());
    log::info!("Imported {} mesh objects and armature '{}'", model.meshes.len(), armature_name);
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "pmd".to_string())
}
