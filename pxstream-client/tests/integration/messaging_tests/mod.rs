mod test_chunked_transfers;
mod test_latency_probe;
mod test_protocol_extension;
mod test_test_echo_reply;
mod test_unknown_type_is_dropped;
