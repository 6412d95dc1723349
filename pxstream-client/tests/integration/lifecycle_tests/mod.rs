mod test_disconnect_during_transport_step;
mod test_signaling_loss_reconnects;
mod test_streamer_selection;
