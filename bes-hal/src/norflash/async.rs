use embassy_futures::yield_now;
use embedded_storage::nor_flash::{check_write, ErrorType};
use embedded_storage_async::nor_flash::{
    NorFlash as AsyncEmbeddedNorFlash, ReadNorFlash as AsyncEmbeddedReadNorFlash,
};

use super::blocking::NorFlash;
use super::controller::Controller;
use super::types::{Error, Progress};

/// Cooperative front end over [`NorFlash`].
///
/// Erase and program always run suspendable. Whenever the chip pauses, the
/// executor gets control back before the operation is resumed.
pub struct AsyncNorFlash<C: Controller> {
    inner: NorFlash<C>,
}

impl<C: Controller> AsyncNorFlash<C> {
    pub fn new(inner: NorFlash<C>) -> Self {
        Self { inner }
    }

    pub fn inner(&mut self) -> &mut NorFlash<C> {
        &mut self.inner
    }

    pub fn into_inner(self) -> NorFlash<C> {
        self.inner
    }

    pub async fn read(&mut self, address: u32, out: &mut [u8]) -> Result<(), Error> {
        self.inner.read(address, out)
    }

    pub async fn erase(&mut self, address: u32, len: u32) -> Result<(), Error> {
        let mut progress = self.inner.erase_suspend(address, len, true)?;
        while progress.is_suspended() {
            yield_now().await;
            progress = self.inner.erase_resume(true)?;
        }
        Ok(())
    }

    pub async fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        let mut progress = self.inner.write_suspend(address, data, true)?;
        while let Progress::Suspended = progress {
            yield_now().await;
            progress = self.inner.write_resume(data, true)?;
        }
        Ok(())
    }
}

impl<C: Controller> ErrorType for AsyncNorFlash<C> {
    type Error = Error;
}

impl<C: Controller> AsyncEmbeddedReadNorFlash for AsyncNorFlash<C> {
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        AsyncNorFlash::read(self, offset, bytes).await
    }

    fn capacity(&self) -> usize {
        self.inner.total_size() as usize
    }
}

impl<C: Controller> AsyncEmbeddedNorFlash for AsyncNorFlash<C> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = 4096;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from == to {
            return Ok(());
        }
        let len = self.inner.erase_span(from, to)?;
        AsyncNorFlash::erase(self, from, len).await
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        check_write(&self.inner, offset, bytes.len()).map_err(Error::from)?;
        AsyncNorFlash::write(self, offset, bytes).await
    }
}
