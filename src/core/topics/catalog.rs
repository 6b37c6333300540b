use crate::core::domain::Category;

/// Built-in topics, grouped by category.
pub(super) const BUILTIN: &[(Category, &[&str])] = &[
    (
        Category::Network,
        &[
            "OSI 7 layers vs the TCP/IP model",
            "TCP vs UDP",
            "TCP 3-way handshake",
            "TCP 4-way connection teardown",
            "HTTP/1.1 vs HTTP/2 vs HTTP/3",
            "How HTTPS and TLS work",
            "DNS resolution and record types",
            "Load balancing algorithms",
            "Content delivery networks",
            "The WebSocket protocol",
            "REST vs GraphQL",
            "gRPC",
            "CORS",
            "NAT and port forwarding",
            "Subnet masks and CIDR",
            "ARP",
            "DHCP",
            "BGP routing",
            "QUIC",
        ],
    ),
    (
        Category::Os,
        &[
            "Processes vs threads",
            "Context switching",
            "CPU scheduling algorithms",
            "Deadlock conditions and prevention",
            "Paging and segmentation",
            "Virtual memory and page replacement",
            "File system layout",
            "Mutexes and semaphores",
            "Interrupts and system calls",
            "Inter-process communication",
            "Cache memory and locality",
            "Concurrency vs parallelism",
            "Race conditions",
            "Kernel mode vs user mode",
            "The boot process",
            "Memory fragmentation",
            "Copy-on-write",
            "Real-time operating systems",
        ],
    ),
    (
        Category::Algorithm,
        &[
            "Time and space complexity",
            "Quicksort vs merge sort vs heapsort",
            "Binary search",
            "Dynamic programming",
            "Greedy algorithms",
            "Divide and conquer",
            "BFS and DFS",
            "Dijkstra's algorithm",
            "Bellman-Ford",
            "Floyd-Warshall",
            "Minimum spanning trees (Kruskal, Prim)",
            "Topological sort",
            "Union-find",
            "KMP string matching",
            "Sliding window",
            "Two pointers",
            "Backtracking",
            "Bit manipulation tricks",
        ],
    ),
    (
        Category::DataStructure,
        &[
            "Arrays vs linked lists",
            "Stacks and queues",
            "Hash tables and collision resolution",
            "Binary search trees",
            "AVL and red-black trees",
            "Heaps",
            "Tries",
            "Graph representations",
            "B-trees and B+ trees",
            "LRU cache",
            "Bloom filters",
            "Skip lists",
            "Deques",
            "Priority queues",
            "Tree traversal orders",
            "Fenwick trees",
            "Segment trees",
        ],
    ),
    (
        Category::Database,
        &[
            "RDBMS vs NoSQL",
            "Normalization and denormalization",
            "How indexes work",
            "ACID transactions",
            "Transaction isolation levels",
            "SQL join types",
            "Partitioning and sharding",
            "Replication strategies",
            "The CAP theorem",
            "MVCC",
            "Query plans and optimization",
            "Connection pooling",
            "Database lock types",
            "Clustered vs non-clustered indexes",
            "Write-ahead logging",
            "Schema migrations",
        ],
    ),
    (
        Category::Oop,
        &[
            "Encapsulation, inheritance and polymorphism",
            "SOLID principles",
            "Single responsibility principle",
            "Open-closed principle",
            "Liskov substitution principle",
            "Interface segregation principle",
            "Dependency inversion principle",
            "Dependency injection",
            "Abstract classes vs interfaces",
            "Composition over inheritance",
            "Overloading vs overriding",
            "Static vs dynamic dispatch",
            "Immutable objects",
            "Equality vs identity",
            "Coupling and cohesion",
            "Law of Demeter",
            "Tell, don't ask",
        ],
    ),
    (
        Category::Ddd,
        &[
            "Domain-driven design overview",
            "Ubiquitous language",
            "Bounded contexts",
            "Context maps",
            "Entities vs value objects",
            "Aggregates",
            "Domain events",
            "The repository pattern",
            "Domain services",
            "Application services",
            "Anti-corruption layer",
            "Strategic vs tactical design",
            "Event storming",
            "The specification pattern",
            "Microservices and DDD",
        ],
    ),
    (
        Category::Tdd,
        &[
            "Red-green-refactor",
            "Writing good unit tests",
            "Test doubles: mocks, stubs and spies",
            "Given-when-then",
            "Test coverage",
            "The test pyramid",
            "Integration testing strategy",
            "End-to-end tests",
            "Behavior-driven development",
            "Designing for testability",
            "Test isolation",
            "Fixtures and setup",
            "Property-based testing",
            "Mutation testing",
            "Testing anti-patterns",
            "Testing legacy code",
        ],
    ),
    (
        Category::DesignPattern,
        &[
            "Singleton",
            "Factory method",
            "Abstract factory",
            "Builder",
            "Prototype",
            "Adapter",
            "Bridge",
            "Composite",
            "Decorator",
            "Facade",
            "Flyweight",
            "Proxy",
            "Chain of responsibility",
            "Command",
            "Iterator",
            "Mediator",
            "Memento",
            "Observer",
            "Strategy",
            "Template method",
            "Visitor",
            "State",
        ],
    ),
    (
        Category::Architecture,
        &[
            "Monolith vs microservices",
            "Layered architecture",
            "Hexagonal architecture",
            "Clean architecture",
            "Event-driven architecture",
            "CQRS",
            "Event sourcing",
            "Service mesh",
            "API gateway",
            "Sidecar pattern",
            "Circuit breaker",
            "Saga pattern",
            "Strangler fig pattern",
            "Bulkhead pattern",
            "The twelve-factor app",
            "Serverless architecture",
            "Multi-tenancy",
            "Caching strategies",
            "Message queues",
        ],
    ),
    (
        Category::Security,
        &[
            "Authentication vs authorization",
            "OAuth 2.0",
            "JSON Web Tokens",
            "Session vs token authentication",
            "XSS and its defenses",
            "CSRF and its defenses",
            "SQL injection",
            "Symmetric vs asymmetric encryption",
            "Password hashing and salting",
            "TLS certificates",
            "Zero trust",
            "OWASP Top 10",
            "Security headers (CSP, HSTS)",
            "Secret management",
            "Multi-factor authentication",
            "Single sign-on",
            "RBAC vs ABAC",
        ],
    ),
    (
        Category::Devops,
        &[
            "CI/CD pipelines",
            "Docker containers",
            "Kubernetes basics",
            "Infrastructure as code",
            "GitOps",
            "Monitoring and logging strategy",
            "Prometheus and Grafana",
            "Blue-green deployment",
            "Canary releases",
            "Rolling updates",
            "Feature flags",
            "Incident response",
            "Site reliability engineering",
            "SLIs, SLOs and SLAs",
            "Chaos engineering",
            "Terraform and Ansible",
        ],
    ),
];
