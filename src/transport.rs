use crate::types::BdAddr;

/// Raw HCI channel the link layer drives.
///
/// The implementation owns the privileged controller device (open, raw
/// bind, poll mechanics). Writes carry fully framed HCI packets. Inbound
/// traffic and transport failures are delivered by the host loop through
/// [`Hci::on_data`](crate::Hci::on_data) and
/// [`Hci::on_transport_error`](crate::Hci::on_transport_error).
///
/// A "network is down" condition (the interface toggling) should be
/// reported as [`ErrorKind::NotConnected`](embedded_io::ErrorKind); the
/// link layer treats it as transient.
pub trait Transport: embedded_io::Write {
    /// Install a kernel-level packet/event filter on the channel.
    fn set_filter(&mut self, filter: &[u8]) -> Result<(), Self::Error>;

    /// Whether the controller device is currently up.
    fn is_dev_up(&mut self) -> bool;

    /// Public address of the local controller.
    fn local_address(&mut self) -> BdAddr;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn set_filter(&mut self, filter: &[u8]) -> Result<(), Self::Error> {
        T::set_filter(self, filter)
    }

    fn is_dev_up(&mut self) -> bool {
        T::is_dev_up(self)
    }

    fn local_address(&mut self) -> BdAddr {
        T::local_address(self)
    }
}
