use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;
use time::format_description::well_known::Rfc3339;

use roshnii_core::{Album, ImageMetadata, User};

use crate::cli::OutputFormat;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_user(user: &User, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(user),
        OutputFormat::Table => {
            println!("{}: {}", "User".cyan(), user.id);
            println!("{}: {}", "Name".cyan(), user.name);
            println!("{}: {}", "Email".cyan(), user.email);
            if let Some(picture) = &user.picture_url {
                println!("{}: {}", "Picture".cyan(), picture);
            }
            Ok(())
        }
    }
}

pub fn print_albums(albums: &[Album], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(albums),
        OutputFormat::Table => {
            if albums.is_empty() {
                println!("No albums found.");
                return Ok(());
            }
            println!("{}", albums_table(albums));
            Ok(())
        }
    }
}

pub fn print_images(images: &[ImageMetadata], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(images),
        OutputFormat::Table => {
            if images.is_empty() {
                println!("No images found.");
                return Ok(());
            }
            println!("{}", images_table(images));
            Ok(())
        }
    }
}

pub fn print_album(album: &Album, format: OutputFormat) -> Result<()> {
    print_albums(std::slice::from_ref(album), format)
}

pub fn print_image(image: &ImageMetadata, format: OutputFormat) -> Result<()> {
    print_images(std::slice::from_ref(image), format)
}

fn albums_table(albums: &[Album]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["ID", "Name", "Description", "Updated"]);
    for album in albums {
        let description = if album.description.is_empty() {
            "-".to_string()
        } else {
            album.description.clone()
        };
        builder.push_record([
            album.id.to_string(),
            album.name.clone(),
            description,
            timestamp(album.updated_at),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

fn images_table(images: &[ImageMetadata]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["ID", "Filename", "Type", "Size", "Dimensions", "Uploaded"]);
    for image in images {
        let dimensions = match (image.width, image.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => "-".to_string(),
        };
        builder.push_record([
            image.id.to_string(),
            image.filename.clone(),
            image.content_type.clone(),
            human_size(image.size),
            dimensions,
            timestamp(image.created_at),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

fn timestamp(at: time::OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn image(id: &str, width: Option<u32>) -> ImageMetadata {
        ImageMetadata {
            id: id.into(),
            user_id: "u1".into(),
            filename: format!("{id}.jpg"),
            content_type: "image/jpeg".into(),
            size: 2048,
            width,
            height: width.map(|w| w / 2),
            created_at: datetime!(2024-05-01 10:00 UTC),
            updated_at: datetime!(2024-05-01 10:00 UTC),
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_images_table_rows() {
        let table = images_table(&[image("i1", Some(640)), image("i2", None)]);
        assert!(table.contains("i1.jpg"));
        assert!(table.contains("640x320"));
        assert!(table.contains("2.0 KB"));
        assert!(table.contains("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_albums_table_marks_empty_description() {
        let album = Album {
            id: "a1".into(),
            user_id: "u1".into(),
            name: "Beach".into(),
            description: String::new(),
            created_at: datetime!(2024-05-01 10:00 UTC),
            updated_at: datetime!(2024-05-02 10:00 UTC),
        };
        let table = albums_table(&[album]);
        assert!(table.contains("Beach"));
        assert!(table.contains(" - "));
    }
}
