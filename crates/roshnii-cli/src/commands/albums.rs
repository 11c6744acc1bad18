use anyhow::Result;
use colored::Colorize;
use roshnii_core::{AlbumId, ImageId};

use super::Context;
use crate::cli::AlbumCommands;
use crate::output::{print_album, print_albums, print_images, print_success};

pub async fn run(ctx: &Context, command: &AlbumCommands) -> Result<()> {
    let client = &ctx.client;
    match command {
        AlbumCommands::List => {
            let albums = client.list_albums().await?;
            print_albums(&albums, ctx.format)?;
        }
        AlbumCommands::Show { id } => {
            let album = client.get_album(&AlbumId::from(id.as_str())).await?;
            print_album(&album, ctx.format)?;
        }
        AlbumCommands::Create { name, description } => {
            let album = client.create_album(name, description).await?;
            print_success(&format!("Created album {} ({})", album.name.cyan(), album.id));
        }
        AlbumCommands::Update {
            id,
            name,
            description,
        } => {
            let id = AlbumId::from(id.as_str());
            // The server replaces both fields, so unset ones keep their current value.
            let current = client.get_album(&id).await?;
            let name = name.as_deref().unwrap_or(&current.name);
            let description = description.as_deref().unwrap_or(&current.description);
            let album = client.update_album(&id, name, description).await?;
            print_success(&format!("Updated album {} ({})", album.name.cyan(), album.id));
        }
        AlbumCommands::Delete { id } => {
            client.delete_album(&AlbumId::from(id.as_str())).await?;
            print_success(&format!("Deleted album {}", id.cyan()));
        }
        AlbumCommands::Images { id } => {
            let images = client.album_images(&AlbumId::from(id.as_str())).await?;
            print_images(&images, ctx.format)?;
        }
        AlbumCommands::Add { album_id, image_id } => {
            client
                .add_image_to_album(
                    &AlbumId::from(album_id.as_str()),
                    &ImageId::from(image_id.as_str()),
                )
                .await?;
            print_success(&format!(
                "Added image {} to album {}",
                image_id.cyan(),
                album_id.cyan()
            ));
        }
        AlbumCommands::Remove { album_id, image_id } => {
            client
                .remove_image_from_album(
                    &AlbumId::from(album_id.as_str()),
                    &ImageId::from(image_id.as_str()),
                )
                .await?;
            print_success(&format!(
                "Removed image {} from album {}",
                image_id.cyan(),
                album_id.cyan()
            ));
        }
    }
    Ok(())
}
