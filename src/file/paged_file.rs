use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::PageNo;

/// A single on-disk file made of fixed-size page slots.
///
/// Page `n` lives at byte offset `n * page_size`. The file length is always an
/// exact multiple of the page size; new pages are only ever appended one at a
/// time through [`PagedFile::allocate_page`].
pub struct PagedFile {
    file: Mutex<File>,
    path: PathBuf,
    page_size: usize,
}

impl PagedFile {
    /// Create a new, empty file
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            page_size,
        })
    }

    /// Open an existing file
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FileError::FileNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(FileError::Misaligned { len, page_size });
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently allocated to the file
    pub fn page_count(&self) -> FileResult<PageNo> {
        let file = self.file.lock();
        self.page_count_locked(&file)
    }

    fn page_count_locked(&self, file: &File) -> FileResult<PageNo> {
        let len = file.metadata()?.len();
        Ok((len / self.page_size as u64) as PageNo)
    }

    fn check_buffer(&self, len: usize) -> FileResult<()> {
        if len != self.page_size {
            return Err(FileError::InvalidPageSize {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }

    /// Read a page into `buffer`. Pages past the end of the file are an error.
    pub fn read_page(&self, page_no: PageNo, buffer: &mut [u8]) -> FileResult<()> {
        self.check_buffer(buffer.len())?;

        let mut file = self.file.lock();
        let page_count = self.page_count_locked(&file)?;
        if page_no >= page_count {
            return Err(FileError::PageOutOfRange {
                page_no,
                page_count,
            });
        }

        let offset = page_no as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)?;

        Ok(())
    }

    /// Overwrite an allocated page slot with `buffer`
    pub fn write_page(&self, page_no: PageNo, buffer: &[u8]) -> FileResult<()> {
        self.check_buffer(buffer.len())?;

        let mut file = self.file.lock();
        let page_count = self.page_count_locked(&file)?;
        if page_no >= page_count {
            return Err(FileError::PageOutOfRange {
                page_no,
                page_count,
            });
        }

        let offset = page_no as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buffer)?;

        Ok(())
    }

    /// Extend the file by exactly one zeroed page and return its number
    pub fn allocate_page(&self) -> FileResult<PageNo> {
        let file = self.file.lock();
        let page_no = self.page_count_locked(&file)?;
        let new_len = (page_no as u64 + 1) * self.page_size as u64;
        file.set_len(new_len)?;
        Ok(page_no)
    }

    /// Flush OS buffers for this file to disk
    pub fn sync(&self) -> FileResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAGE: usize = 256;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_create_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.dat");

        let file = PagedFile::create(&test_file, PAGE).unwrap();
        assert!(test_file.exists());
        assert_eq!(file.page_count().unwrap(), 0);
    }

    #[test]
    fn test_create_file_already_exists() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.dat");

        PagedFile::create(&test_file, PAGE).unwrap();
        let result = PagedFile::create(&test_file, PAGE);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_nonexistent_file() {
        let temp_dir = setup_test_dir();
        let result = PagedFile::open(temp_dir.path().join("missing.dat"), PAGE);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_open_misaligned_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.dat");
        std::fs::write(&test_file, vec![0u8; PAGE + 3]).unwrap();

        let result = PagedFile::open(&test_file, PAGE);
        assert!(matches!(result, Err(FileError::Misaligned { .. })));
    }

    #[test]
    fn test_allocate_extends_by_one_page() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.dat");
        let file = PagedFile::create(&test_file, PAGE).unwrap();

        assert_eq!(file.allocate_page().unwrap(), 0);
        assert_eq!(file.allocate_page().unwrap(), 1);
        assert_eq!(file.page_count().unwrap(), 2);
        assert_eq!(
            std::fs::metadata(&test_file).unwrap().len(),
            2 * PAGE as u64
        );
    }

    #[test]
    fn test_read_write_page() {
        let temp_dir = setup_test_dir();
        let file = PagedFile::create(temp_dir.path().join("test.dat"), PAGE).unwrap();
        file.allocate_page().unwrap();
        file.allocate_page().unwrap();

        let mut write_buffer = vec![0u8; PAGE];
        write_buffer[0] = 42;
        write_buffer[PAGE - 1] = 255;
        file.write_page(1, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; PAGE];
        file.read_page(1, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);

        // Page 0 is untouched
        file.read_page(0, &mut read_buffer).unwrap();
        assert!(read_buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_out_of_range_fails() {
        let temp_dir = setup_test_dir();
        let file = PagedFile::create(temp_dir.path().join("test.dat"), PAGE).unwrap();
        file.allocate_page().unwrap();

        let mut buffer = vec![0u8; PAGE];
        let result = file.read_page(1, &mut buffer);
        assert!(matches!(
            result,
            Err(FileError::PageOutOfRange {
                page_no: 1,
                page_count: 1
            })
        ));
    }

    #[test]
    fn test_write_out_of_range_fails() {
        let temp_dir = setup_test_dir();
        let file = PagedFile::create(temp_dir.path().join("test.dat"), PAGE).unwrap();

        let buffer = vec![0u8; PAGE];
        assert!(matches!(
            file.write_page(0, &buffer),
            Err(FileError::PageOutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let temp_dir = setup_test_dir();
        let file = PagedFile::create(temp_dir.path().join("test.dat"), PAGE).unwrap();
        file.allocate_page().unwrap();

        let mut small_buffer = vec![0u8; PAGE - 1];
        let result = file.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));

        let large_buffer = vec![0u8; PAGE + 1];
        let result = file.write_page(0, &large_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));
    }

    #[test]
    fn test_reopen_keeps_pages() {
        let temp_dir = setup_test_dir();
        let path = temp_dir.path().join("test.dat");
        {
            let file = PagedFile::create(&path, PAGE).unwrap();
            file.allocate_page().unwrap();
            let mut buffer = vec![0u8; PAGE];
            buffer[7] = 7;
            file.write_page(0, &buffer).unwrap();
            file.sync().unwrap();
        }

        let file = PagedFile::open(&path, PAGE).unwrap();
        assert_eq!(file.page_count().unwrap(), 1);
        let mut buffer = vec![0u8; PAGE];
        file.read_page(0, &mut buffer).unwrap();
        assert_eq!(buffer[7], 7);
    }
}
