use axum::body::Bytes;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

const INVOICES_DIR: &str = "uploads/invoices";
const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "pdf"];

pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// Write uploaded invoice files to disk and return their public paths.
/// Files with an unsupported extension are skipped, matching how receipt
/// uploads are filtered elsewhere in the stack.
pub async fn save_invoices(files: Vec<UploadedFile>) -> Result<Vec<String>, std::io::Error> {
    let mut paths = Vec::with_capacity(files.len());
    if files.is_empty() {
        return Ok(paths);
    }

    let invoices_dir = PathBuf::from(INVOICES_DIR);
    if !invoices_dir.exists() {
        fs::create_dir_all(&invoices_dir).await?;
    }

    for file in files {
        let extension = PathBuf::from(&file.filename)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            log::warn!("skipping invoice upload with unsupported extension: {}", file.filename);
            continue;
        }

        let new_file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let file_path = invoices_dir.join(&new_file_name);
        fs::write(&file_path, &file.data).await?;
        paths.push(format!("/{}/{}", INVOICES_DIR, new_file_name));
    }

    Ok(paths)
}
