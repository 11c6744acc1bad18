use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};
use colored::Colorize;
use roshnii_core::ImageId;

use super::Context;
use crate::cli::ImageCommands;
use crate::output::{print_image, print_images, print_success};

pub async fn run(ctx: &Context, command: &ImageCommands) -> Result<()> {
    let client = &ctx.client;
    match command {
        ImageCommands::List { filter } => {
            let images = client.list_images(filter.as_deref()).await?;
            print_images(&images, ctx.format)?;
        }
        ImageCommands::Show { id } => {
            let image = client.get_image(&ImageId::from(id.as_str())).await?;
            print_image(&image, ctx.format)?;
        }
        ImageCommands::Upload { path, content_type } => {
            let file = Path::new(path);
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("Not a file path: {path}"))?;
            let content_type = match content_type {
                Some(ct) => ct.clone(),
                None => guess_content_type(file)
                    .with_context(|| format!("Cannot guess the type of {path}; pass --content-type"))?
                    .to_string(),
            };
            let bytes = fs::read(file).with_context(|| format!("Failed to read file: {path}"))?;
            let image = client.upload_image(file_name, &content_type, bytes).await?;
            print_success(&format!("Uploaded {} ({})", image.filename.cyan(), image.id));
        }
        ImageCommands::Download { id, output } => {
            let id = ImageId::from(id.as_str());
            let destination = match output {
                Some(path) => path.clone(),
                None => client.get_image(&id).await?.filename,
            };
            let bytes = client.download_image(&id).await?;
            fs::write(&destination, &bytes[..])
                .with_context(|| format!("Failed to write {destination}"))?;
            print_success(&format!(
                "Saved {} bytes to {}",
                bytes.len(),
                destination.cyan()
            ));
        }
        ImageCommands::Delete { id } => {
            client.delete_image(&ImageId::from(id.as_str())).await?;
            print_success(&format!("Deleted image {}", id.cyan()));
        }
    }
    Ok(())
}

/// Content types the upload endpoint accepts, by extension.
fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a/B.JPG")), Some("image/jpeg"));
        assert_eq!(guess_content_type(Path::new("cat.webp")), Some("image/webp"));
        assert_eq!(guess_content_type(Path::new("notes.txt")), None);
        assert_eq!(guess_content_type(Path::new("README")), None);
    }
}
