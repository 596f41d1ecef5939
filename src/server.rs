// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Line-oriented query listener.
//!
//! A request is a single line `COMMAND schema.table pk=value field=value "start" "end"`
//! where `start` and `end` are `YYYY-MM-DD HH:MM:SS` times. Supported commands:
//!
//! * `GET` replies with the captured transaction, newest event first;
//! * `ROLLBACK` executes compensating statements and replies with them.

use tracing::{debug, info, warn};

use std::{
    fmt,
    io::{self, BufRead, BufReader, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread,
};

use crate::{
    binlog::time::parse_datetime,
    error::{Error, Result},
    rollback::{Field, Rollback, RollbackQuery},
};

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: String,
    pub args: Vec<String>,
}

impl Request {
    /// Splits `line` on whitespace. Double quotes group words into one argument.
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = Vec::new();
        let mut current: Option<String> = None;
        let mut quoted = false;

        for c in line.trim().chars() {
            match c {
                '"' => {
                    quoted = !quoted;
                    current.get_or_insert_with(String::new);
                }
                c if c.is_whitespace() && !quoted => {
                    words.extend(current.take());
                }
                c => current.get_or_insert_with(String::new).push(c),
            }
        }
        if quoted {
            return Err(Error::Request("unterminated quote".into()));
        }
        words.extend(current.take());

        let mut words = words.into_iter();
        let command = words
            .next()
            .ok_or_else(|| Error::Request("empty request".into()))?;
        Ok(Self {
            command: command.to_ascii_uppercase(),
            args: words.collect(),
        })
    }

    /// Validates arguments and builds a query from them.
    pub fn to_query(&self) -> Result<RollbackQuery> {
        if self.args.len() != 5 {
            return Err(Error::Request("args size must be 5".into()));
        }

        let (schema, table) = split_pair(&self.args[0], '.')
            .ok_or_else(|| Error::Request("first args must be schema.table".into()))?;

        let fields = self.args[1..3]
            .iter()
            .map(|arg| {
                split_pair(arg, '=')
                    .map(|(name, value)| Field::new(name, value))
                    .ok_or_else(|| Error::Request("field args must be field=val".into()))
            })
            .collect::<Result<Vec<_>>>()?;

        let time = |arg: &String| {
            parse_datetime(arg)
                .ok_or_else(|| Error::Request(format!("parse str:{} to time failed", arg)))
        };

        Ok(RollbackQuery {
            schema: schema.into(),
            table: table.into(),
            fields,
            start_time: time(&self.args[3])?,
            end_time: time(&self.args[4])?,
        })
    }
}

/// Splits at the first `sep`, which must not be the last char.
fn split_pair(arg: &str, sep: char) -> Option<(&str, &str)> {
    match arg.split_once(sep) {
        Some((_, "")) | None => None,
        pair => pair,
    }
}

/// Reply to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Multi(Vec<String>),
}

impl Reply {
    pub fn write_to<W: Write>(&self, mut output: W) -> io::Result<()> {
        write!(output, "{}", self)?;
        output.flush()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(code) => write!(f, "+{}\r\n", code),
            Reply::Error(message) => write!(f, "-ERR {}\r\n", message),
            Reply::Multi(lines) => {
                write!(f, "*{}\r\n", lines.len())?;
                for line in lines {
                    write!(f, "${}\r\n{}\r\n", line.len(), line)?;
                }
                Ok(())
            }
        }
    }
}

impl From<Error> for Reply {
    fn from(err: Error) -> Self {
        Reply::Error(err.to_string())
    }
}

/// Nothing to list is a plain `+OK`.
impl From<Result<Vec<String>>> for Reply {
    fn from(result: Result<Vec<String>>) -> Self {
        match result {
            Ok(lines) if lines.is_empty() => Reply::Status("OK".into()),
            Ok(lines) => Reply::Multi(lines),
            Err(err) => err.into(),
        }
    }
}

/// Answers a request.
pub fn handle(rollback: &Rollback, request: &Request) -> Reply {
    let query = match request.to_query() {
        Ok(query) => query,
        Err(err) => return err.into(),
    };

    let result: Result<Vec<String>> = match request.command.as_str() {
        "GET" => rollback
            .capture(&query)
            .map(|events| events.iter().map(|e| e.to_string()).collect()),
        "ROLLBACK" => rollback.rollback(&query),
        _ => return Reply::Error("unsupported command".into()),
    };

    if let Err(ref err) = result {
        warn!("{} {} failed: {}", request.command, query, err);
    }
    result.into()
}

/// TCP listener serving requests on a thread per connection.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    rollback: Arc<Rollback>,
}

impl Server {
    pub fn bind<A: ToSocketAddrs>(addr: A, rollback: Arc<Rollback>) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            rollback,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever.
    pub fn serve(&self) -> Result<()> {
        info!("listening on {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("accept failed: {}", err);
                    continue;
                }
            };
            let rollback = self.rollback.clone();
            thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                if let Err(err) = serve_connection(&rollback, stream) {
                    debug!("connection {:?} closed: {}", peer, err);
                }
            });
        }

        Ok(())
    }
}

fn serve_connection(rollback: &Rollback, stream: TcpStream) -> Result<()> {
    let mut output = stream.try_clone()?;
    for line in BufReader::new(stream).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match Request::parse(&line) {
            Ok(request) => handle(rollback, &request),
            Err(err) => err.into(),
        };
        reply.write_to(&mut output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binlog::RowsEventKind,
        history::EventHistory,
        proto::tests::MockConnection,
        rollback::scanner::tests::{gtid, rows, xid},
        schema::{ColumnDef, SchemaCatalog},
    };

    use std::io::Read;

    fn rollback() -> Arc<Rollback> {
        let schema = SchemaCatalog::new();
        schema.set_columns(
            "shop",
            "orders",
            vec![
                ColumnDef::new("id", "int(10) unsigned"),
                ColumnDef::new("name", "varchar(32)"),
            ],
        );
        let history = EventHistory::new();
        for event in vec![
            xid(1_600_000_000, 1),
            rows(RowsEventKind::Write, 1_600_000_000, 1, "a"),
            gtid(1_600_000_000, 3),
        ] {
            history.append((*event).clone());
        }
        Arc::new(Rollback::new(
            Box::new(MockConnection::default()),
            Arc::new(schema),
            Arc::new(history),
        ))
    }

    const WINDOW: &str = r#""2020-09-13 12:00:00" "2020-09-13 12:26:40""#;

    #[test]
    fn should_parse_quoted_args() {
        let request =
            Request::parse(&format!("get shop.orders id=1 name=a {}", WINDOW)).unwrap();
        assert_eq!(request.command, "GET");
        assert_eq!(
            request.args,
            vec![
                "shop.orders",
                "id=1",
                "name=a",
                "2020-09-13 12:00:00",
                "2020-09-13 12:26:40"
            ]
        );

        let query = request.to_query().unwrap();
        assert_eq!(query.schema, "shop");
        assert_eq!(query.table, "orders");
        assert_eq!(query.fields[0], Field::new("id", "1"));
        assert_eq!(query.start_time, 1_599_998_400);
        assert_eq!(query.end_time, 1_600_000_000);

        assert!(Request::parse("  ").is_err());
        assert!(Request::parse("GET \"open").is_err());
        assert_eq!(Request::parse("GET \"\"").unwrap().args, vec![""]);
    }

    #[test]
    fn should_validate_args() {
        let message = |line: &str| match Request::parse(line).unwrap().to_query() {
            Err(Error::Request(msg)) => msg,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(message("GET a.b id=1"), "args size must be 5");
        assert_eq!(
            message(&format!("GET orders id=1 name=a {}", WINDOW)),
            "first args must be schema.table"
        );
        assert_eq!(
            message(&format!("GET shop. id=1 name=a {}", WINDOW)),
            "first args must be schema.table"
        );
        assert_eq!(
            message(&format!("GET shop.orders id= name=a {}", WINDOW)),
            "field args must be field=val"
        );
        assert_eq!(
            message("GET shop.orders id=1 name=a yesterday \"2020-09-13 12:26:40\""),
            "parse str:yesterday to time failed"
        );
    }

    #[test]
    fn should_format_replies() {
        assert_eq!(Reply::from(Ok(vec![])), Reply::Status("OK".into()));
        assert_eq!(Reply::from(Ok(vec![])).to_string(), "+OK\r\n");
        assert_eq!(Reply::Error("boom".into()).to_string(), "-ERR boom\r\n");
        assert_eq!(
            Reply::Multi(vec!["ab".into(), "".into()]).to_string(),
            "*2\r\n$2\r\nab\r\n$0\r\n\r\n"
        );
    }

    #[test]
    fn should_handle_commands() {
        let rollback = rollback();

        let get = Request::parse(&format!("GET shop.orders id=1 name=a {}", WINDOW)).unwrap();
        match handle(&rollback, &get) {
            Reply::Multi(lines) => {
                assert_eq!(lines.len(), 3);
                assert!(lines[0].contains("Gtid"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let undo =
            Request::parse(&format!("ROLLBACK shop.orders id=1 name=a {}", WINDOW)).unwrap();
        assert_eq!(
            handle(&rollback, &undo),
            Reply::Multi(vec![
                "DELETE FROM `shop`.`orders` WHERE `id` = 1 AND `name` = 'a'".into()
            ])
        );

        let other = Request::parse(&format!("PURGE shop.orders id=1 name=a {}", WINDOW)).unwrap();
        assert_eq!(
            handle(&rollback, &other),
            Reply::Error("unsupported command".into())
        );

        let missing =
            Request::parse(&format!("GET shop.orders id=2 name=a {}", WINDOW)).unwrap();
        assert_eq!(
            handle(&rollback, &missing),
            Reply::from(Error::TransactionNotFound)
        );
    }

    #[test]
    fn should_serve_over_tcp() {
        let server = Server::bind("127.0.0.1:0", rollback()).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || server.serve());

        let mut client = TcpStream::connect(addr).unwrap();
        write!(client, "PING\r\n").unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert_eq!(reply, "-ERR bad request: args size must be 5\r\n");
    }
}
