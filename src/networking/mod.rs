/*!

# Networking Interfaces and Methods

## Introduction

Nodes talk to each other with single UDP datagrams. There are no connections and
no sessions: a request carries a token id, and the answer comes back as a separate
datagram tagged with that id. Loss simply shows up as a timeout.

Every node owns exactly one socket. One task reads it and dispatches each datagram;
application work (store lookups, challenges) runs on other tasks and only ever
waits on its own call token.

## Packets

```bytes
0       packet type (Ping=0, Data=1)
..      sender contact (identifier, network tag, port as u32, textual address,
        each variable field with a u32 length prefix)
..      Ping: token id (u64)
        Data: consumer name, body (both u32 length prefixed)
```

All integers are big-endian. The format has no version field, so every node in one
deployment must agree on it. Datagrams from a different network tag are dropped.

## Consumers

A Data packet names the consumer that should receive its body.

```bytes
callback    responses: token id (u64) + payload, completes a waiting call token
store       get / put requests for the replicated store
pseudonym   identity challenges and sealed messages
```

Further consumers can be registered at runtime; sealed messages are re-delivered
to whichever local consumer they name.

## Ping

A Ping carries a token id. The receiver answers with an empty `callback` response
for that token and tells its routing table the sender is alive. The requester does
the same once the answer arrives.

*/

pub mod callback;
pub mod contact;
pub mod message_types;
pub mod network;
pub mod packet;
pub mod signals;
